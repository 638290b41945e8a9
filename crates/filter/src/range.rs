use crate::filter::CandidateFilter;
use crate::value::ValueSource;
use votematch_model::{Candidate, CandidateDict, QuestionDict};

/// Inclusive numeric bounds over one candidate value. Candidates without a
/// numeric value fail an active range filter.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    name: String,
    source: ValueSource,
    bounds: Option<(f64, f64)>,
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeFilter {
    #[must_use]
    pub fn new(name: impl Into<String>, source: ValueSource) -> Self {
        Self {
            name: name.into(),
            source,
            bounds: None,
            min: None,
            max: None,
        }
    }

    pub fn add_value_of(&mut self, candidate: &Candidate) {
        if let Some(value) = self.source.number_of(candidate) {
            self.bounds = Some(match self.bounds {
                None => (value, value),
                Some((lo, hi)) => (lo.min(value), hi.max(value)),
            });
        }
    }

    pub fn scan(&mut self, candidates: &CandidateDict) {
        for candidate in candidates.values() {
            self.add_value_of(candidate);
        }
    }

    /// Smallest and largest value seen while scanning.
    #[must_use]
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    pub fn set_min(&mut self, min: Option<f64>) {
        self.min = min.filter(|v| !v.is_nan());
    }

    pub fn set_max(&mut self, max: Option<f64>) {
        self.max = max.filter(|v| !v.is_nan());
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.max
    }
}

impl CandidateFilter for RangeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    fn matches(&self, candidate: &Candidate, _questions: &QuestionDict) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(value) = self.source.number_of(candidate) else {
            return false;
        };
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    fn clear_rules(&mut self) {
        self.min = None;
        self.max = None;
    }
}
