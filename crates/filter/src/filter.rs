use crate::agreement::QuestionAgreementFilter;
use crate::error::{FilterError, Result};
use crate::exact::ExactMatchFilter;
use crate::range::RangeFilter;
use votematch_model::{Candidate, CandidateDict, QuestionDict};

/// Capability set shared by every filter variant.
pub trait CandidateFilter {
    fn name(&self) -> &str;

    /// True iff at least one rule category holds a rule.
    fn is_active(&self) -> bool;

    /// True iff the candidate satisfies every active rule category.
    fn matches(&self, candidate: &Candidate, questions: &QuestionDict) -> bool;

    fn clear_rules(&mut self);

    /// Evaluate every candidate, record the verdict on it and return how
    /// many were excluded. Re-applying unchanged rules gives the same result.
    fn apply(&self, candidates: &mut CandidateDict, questions: &QuestionDict) -> usize {
        let mut excluded = 0;
        for candidate in candidates.values_mut() {
            let passed = self.matches(candidate, questions);
            candidate.record_filter_verdict(self.name(), passed);
            if !passed {
                excluded += 1;
            }
        }
        log::debug!(
            "Filter '{}' excluded {} of {} candidates",
            self.name(),
            excluded,
            candidates.len()
        );
        excluded
    }
}

/// The closed set of filter variants the matcher builds.
#[derive(Debug)]
pub enum Filter {
    Exact(ExactMatchFilter),
    Range(RangeFilter),
    Agreement(QuestionAgreementFilter),
}

impl Filter {
    pub fn exact(&self) -> Result<&ExactMatchFilter> {
        match self {
            Self::Exact(filter) => Ok(filter),
            _ => Err(self.wrong_kind("exact-match")),
        }
    }

    pub fn exact_mut(&mut self) -> Result<&mut ExactMatchFilter> {
        match self {
            Self::Exact(filter) => Ok(filter),
            _ => Err(self.wrong_kind("exact-match")),
        }
    }

    pub fn range_mut(&mut self) -> Result<&mut RangeFilter> {
        match self {
            Self::Range(filter) => Ok(filter),
            _ => Err(self.wrong_kind("range")),
        }
    }

    pub fn agreement(&self) -> Result<&QuestionAgreementFilter> {
        match self {
            Self::Agreement(filter) => Ok(filter),
            _ => Err(self.wrong_kind("question agreement")),
        }
    }

    pub fn agreement_mut(&mut self) -> Result<&mut QuestionAgreementFilter> {
        match self {
            Self::Agreement(filter) => Ok(filter),
            _ => Err(self.wrong_kind("question agreement")),
        }
    }

    fn wrong_kind(&self, expected: &'static str) -> FilterError {
        FilterError::WrongKind {
            name: self.name().to_string(),
            expected,
        }
    }

    fn inner(&self) -> &dyn CandidateFilter {
        match self {
            Self::Exact(filter) => filter,
            Self::Range(filter) => filter,
            Self::Agreement(filter) => filter,
        }
    }
}

impl CandidateFilter for Filter {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn is_active(&self) -> bool {
        self.inner().is_active()
    }

    fn matches(&self, candidate: &Candidate, questions: &QuestionDict) -> bool {
        self.inner().matches(candidate, questions)
    }

    fn clear_rules(&mut self) {
        match self {
            Self::Exact(filter) => filter.clear_rules(),
            Self::Range(filter) => filter.clear_rules(),
            Self::Agreement(filter) => filter.clear_rules(),
        }
    }
}

impl From<ExactMatchFilter> for Filter {
    fn from(filter: ExactMatchFilter) -> Self {
        Self::Exact(filter)
    }
}

impl From<RangeFilter> for Filter {
    fn from(filter: RangeFilter) -> Self {
        Self::Range(filter)
    }
}

impl From<QuestionAgreementFilter> for Filter {
    fn from(filter: QuestionAgreementFilter) -> Self {
        Self::Agreement(filter)
    }
}
