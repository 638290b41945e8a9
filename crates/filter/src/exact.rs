use crate::filter::CandidateFilter;
use crate::value::{FilterValue, ValueSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use votematch_model::{Candidate, CandidateDict, QuestionDict};

/// How required values combine when a candidate has several values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicOperator {
    /// Any required value suffices
    #[default]
    Or,
    /// Every required value must be present
    And,
}

/// Required/excluded value sets over one candidate attribute or one
/// question's answers.
#[derive(Debug, Clone)]
pub struct ExactMatchFilter {
    name: String,
    source: ValueSource,
    multiple_values: bool,
    logic: LogicOperator,
    values: BTreeSet<FilterValue>,
    required: BTreeSet<FilterValue>,
    excluded: BTreeSet<FilterValue>,
}

impl ExactMatchFilter {
    #[must_use]
    pub fn new(name: impl Into<String>, source: ValueSource) -> Self {
        Self {
            name: name.into(),
            source,
            multiple_values: false,
            logic: LogicOperator::Or,
            values: BTreeSet::new(),
            required: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }

    /// Treat candidate values as lists, combining required values with `logic`.
    #[must_use]
    pub fn with_multiple_values(mut self, logic: LogicOperator) -> Self {
        self.multiple_values = true;
        self.logic = logic;
        self
    }

    #[must_use]
    pub fn source(&self) -> &ValueSource {
        &self.source
    }

    /// Add the candidate's values to the selectable domain.
    pub fn add_values_of(&mut self, candidate: &Candidate) {
        self.values.extend(self.source.values_of(candidate));
    }

    pub fn scan(&mut self, candidates: &CandidateDict) {
        for candidate in candidates.values() {
            self.add_values_of(candidate);
        }
    }

    #[must_use]
    pub fn values(&self) -> &BTreeSet<FilterValue> {
        &self.values
    }

    pub fn require(&mut self, value: FilterValue) {
        self.required.insert(value);
    }

    pub fn dont_require(&mut self, value: &FilterValue) {
        self.required.remove(value);
    }

    #[must_use]
    pub fn is_required(&self, value: &FilterValue) -> bool {
        self.required.contains(value)
    }

    #[must_use]
    pub fn required(&self) -> &BTreeSet<FilterValue> {
        &self.required
    }

    pub fn exclude(&mut self, value: FilterValue) {
        self.excluded.insert(value);
    }

    pub fn dont_exclude(&mut self, value: &FilterValue) {
        self.excluded.remove(value);
    }

    #[must_use]
    pub fn is_excluded(&self, value: &FilterValue) -> bool {
        self.excluded.contains(value)
    }

    #[must_use]
    pub fn excluded(&self) -> &BTreeSet<FilterValue> {
        &self.excluded
    }

    fn satisfies_required(&self, values: &[FilterValue]) -> bool {
        if self.required.is_empty() {
            return true;
        }
        if !self.multiple_values {
            return values.first().is_some_and(|v| self.required.contains(v));
        }
        match self.logic {
            LogicOperator::Or => values.iter().any(|v| self.required.contains(v)),
            LogicOperator::And => self.required.iter().all(|r| values.contains(r)),
        }
    }
}

impl CandidateFilter for ExactMatchFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        !self.required.is_empty() || !self.excluded.is_empty()
    }

    fn matches(&self, candidate: &Candidate, _questions: &QuestionDict) -> bool {
        let values = self.source.values_of(candidate);
        self.satisfies_required(&values) && !values.iter().any(|v| self.excluded.contains(v))
    }

    fn clear_rules(&mut self) {
        self.required.clear();
        self.excluded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(filter: &ExactMatchFilter, candidate: &Candidate) -> bool {
        filter.matches(candidate, &QuestionDict::new())
    }

    #[test]
    fn required_and_excluded_sets() {
        let red = Candidate::new("a", "red");
        let blue = Candidate::new("b", "blue");
        let mut filter = ExactMatchFilter::new("party", ValueSource::Party);

        filter.require("red".into());
        assert!(matches(&filter, &red));
        assert!(!matches(&filter, &blue));

        filter.clear_rules();
        filter.exclude("red".into());
        assert!(!matches(&filter, &red));
        assert!(matches(&filter, &blue));
        assert!(filter.is_excluded(&"red".into()));
    }

    #[test]
    fn removing_last_rule_deactivates() {
        let mut filter = ExactMatchFilter::new("party", ValueSource::Party);
        filter.require("red".into());
        assert!(filter.is_active());
        filter.dont_require(&"red".into());
        assert!(!filter.is_active());
        assert!(!filter.is_required(&"red".into()));
    }

    #[test]
    fn list_values_combine_with_logic_operator() {
        let themes = ValueSource::Question("themes".into());
        let candidate = Candidate::new("a", "red").with_answer("themes", vec![1.0, 2.0]);

        let mut any = ExactMatchFilter::new("themes", themes.clone())
            .with_multiple_values(LogicOperator::Or);
        any.require(FilterValue::Number(2));
        any.require(FilterValue::Number(5));
        assert!(matches(&any, &candidate));

        let mut all = ExactMatchFilter::new("themes", themes).with_multiple_values(LogicOperator::And);
        all.require(FilterValue::Number(1));
        all.require(FilterValue::Number(2));
        assert!(matches(&all, &candidate));
        all.require(FilterValue::Number(5));
        assert!(!matches(&all, &candidate));
    }

    #[test]
    fn missing_value_fails_requirement_but_not_exclusion() {
        let candidate = Candidate::new("a", "red");
        let mut filter = ExactMatchFilter::new("gender", ValueSource::Question("gender".into()));
        filter.exclude("male".into());
        assert!(matches(&filter, &candidate));
        filter.require("female".into());
        assert!(!matches(&filter, &candidate));
    }

    #[test]
    fn scan_collects_value_domain() {
        let candidates: CandidateDict = [
            Candidate::new("a", "red"),
            Candidate::new("b", "blue"),
            Candidate::new("c", "red"),
        ]
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
        let mut filter = ExactMatchFilter::new("party", ValueSource::Party);
        filter.scan(&candidates);
        let values: Vec<String> = filter.values().iter().map(ToString::to_string).collect();
        assert_eq!(values, vec!["blue", "red"]);
    }
}
