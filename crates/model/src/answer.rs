use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A raw answer as given by a voter, a candidate or a party average.
///
/// Numeric questions expect [`Answer::Number`]; preference-order questions
/// expect [`Answer::Sequence`] holding option keys in ranked order. Text is
/// kept for informational questions (e.g. gender) and is read as a number
/// when it parses as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Number(f64),
    Sequence(Vec<f64>),
    Text(String),
}

impl Answer {
    /// Scalar view of the answer. `NaN` is returned as-is and treated as
    /// missing by the question model.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok(),
            Self::Sequence(_) => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[f64]> {
        match self {
            Self::Sequence(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Answer {
    /// Plain decimal for numbers (`3`, `2.5`), comma-joined for sequences.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Sequence(values) => {
                let joined = values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for Answer {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Answer {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<Vec<f64>> for Answer {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values)
    }
}

impl From<&str> for Answer {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Answer maps may carry explicit `null`s for unanswered questions; those
/// are dropped so that "missing" always means "absent from the map".
pub(crate) fn deserialize_answer_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Answer>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Option<Answer>> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect())
}
