use serde::{Deserialize, Serialize};
use std::fmt;
use votematch_model::{Answer, Candidate};

/// A discrete value an exact-match filter can require or exclude.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(i64),
    Text(String),
}

impl FilterValue {
    #[allow(clippy::cast_possible_truncation)]
    fn from_number(value: f64) -> Option<Self> {
        if value.is_nan() {
            None
        } else if value.fract() == 0.0 {
            Some(Self::Number(value as i64))
        } else {
            Some(Self::Text(value.to_string()))
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// Where a filter reads a candidate's value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// The candidate's party id
    Party,
    /// A named entry of the candidate's attributes
    Attribute(String),
    /// The candidate's answer to a question
    Question(String),
}

impl ValueSource {
    /// All discrete values the candidate has for this source. Sequences
    /// yield one value per element.
    #[must_use]
    pub fn values_of(&self, candidate: &Candidate) -> Vec<FilterValue> {
        match self {
            Self::Party => vec![FilterValue::Text(candidate.party_id.clone())],
            Self::Attribute(key) => candidate
                .attributes
                .get(key)
                .map(|v| vec![FilterValue::Text(v.clone())])
                .unwrap_or_default(),
            Self::Question(id) => match candidate.answer_by_id(id) {
                None => Vec::new(),
                Some(Answer::Number(value)) => FilterValue::from_number(*value).into_iter().collect(),
                Some(Answer::Sequence(values)) => values
                    .iter()
                    .filter_map(|v| FilterValue::from_number(*v))
                    .collect(),
                Some(Answer::Text(text)) if text.trim().is_empty() => Vec::new(),
                Some(Answer::Text(text)) => vec![FilterValue::Text(text.clone())],
            },
        }
    }

    /// Scalar numeric value, used by range filters.
    #[must_use]
    pub fn number_of(&self, candidate: &Candidate) -> Option<f64> {
        let value = match self {
            Self::Party => None,
            Self::Attribute(key) => candidate
                .attributes
                .get(key)
                .and_then(|v| v.trim().parse::<f64>().ok()),
            Self::Question(id) => candidate.answer_by_id(id).and_then(Answer::as_number),
        };
        value.filter(|v| !v.is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_values_by_source() {
        let candidate = Candidate::new("c1", "green")
            .with_attribute("language", "fi")
            .with_answer("age", 42.0)
            .with_answer("themes", vec![3.0, 7.0])
            .with_answer("gender", "female");

        assert_eq!(
            ValueSource::Party.values_of(&candidate),
            vec![FilterValue::from("green")]
        );
        assert_eq!(
            ValueSource::Attribute("language".into()).values_of(&candidate),
            vec![FilterValue::from("fi")]
        );
        assert_eq!(
            ValueSource::Question("themes".into()).values_of(&candidate),
            vec![FilterValue::Number(3), FilterValue::Number(7)]
        );
        assert_eq!(
            ValueSource::Question("gender".into()).values_of(&candidate),
            vec![FilterValue::from("female")]
        );
        assert!(ValueSource::Question("missing".into())
            .values_of(&candidate)
            .is_empty());
        assert_eq!(
            ValueSource::Question("age".into()).number_of(&candidate),
            Some(42.0)
        );
    }
}
