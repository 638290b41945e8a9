use crate::agreement::AgreementType;
use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One point of a value domain. A `None` label displays the key itself,
/// an empty label displays nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleValue {
    pub key: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ScaleValue {
    #[must_use]
    pub fn new(key: i64) -> Self {
        Self { key, label: None }
    }

    #[must_use]
    pub fn labelled(key: i64, label: impl Into<String>) -> Self {
        Self {
            key,
            label: Some(label.into()),
        }
    }
}

/// Validate and sort a value domain: non-empty, unique keys, ascending.
fn sorted_domain(mut values: Vec<ScaleValue>) -> Result<Vec<ScaleValue>> {
    if values.is_empty() {
        return Err(ModelError::InvalidDomain(
            "value domain must not be empty".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(values.len());
    for value in &values {
        if !seen.insert(value.key) {
            return Err(ModelError::InvalidDomain(format!(
                "duplicate key {}",
                value.key
            )));
        }
    }
    values.sort_by_key(|v| v.key);
    Ok(values)
}

/// Ordered value domain of a numeric question plus the agreement and
/// distance primitives defined over it.
///
/// `min_answer`, `max_answer` and `neutral_answer` are derived from the
/// sorted keys every time the values are assigned and never touched
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ScaleValue>", into = "Vec<ScaleValue>")]
pub struct NumericScale {
    values: Vec<ScaleValue>,
    min_answer: i64,
    max_answer: i64,
    neutral_answer: i64,
}

impl NumericScale {
    pub fn new(values: Vec<ScaleValue>) -> Result<Self> {
        let values = sorted_domain(values)?;
        let min_answer = values[0].key;
        let max_answer = values[values.len() - 1].key;
        let neutral_answer = values[values.len() / 2].key;
        Ok(Self {
            values,
            min_answer,
            max_answer,
            neutral_answer,
        })
    }

    /// `points` consecutive keys starting at 1. When labels are given they go
    /// on the first, middle and last positions; every other position gets an
    /// empty label.
    pub fn likert(points: usize, labels: Option<[&str; 3]>) -> Result<Self> {
        let middle = points / 2;
        let values = (0..points)
            .map(|idx| {
                #[allow(clippy::cast_possible_wrap)]
                let key = idx as i64 + 1;
                match labels {
                    None => ScaleValue::new(key),
                    Some([first, mid, last]) => {
                        let label = if idx == 0 {
                            first
                        } else if idx == middle {
                            mid
                        } else if idx + 1 == points {
                            last
                        } else {
                            ""
                        };
                        ScaleValue::labelled(key, label)
                    }
                }
            })
            .collect();
        Self::new(values)
    }

    /// Seven-point agreement scale labelled at 1, 4 and 7.
    #[must_use]
    pub fn likert_seven() -> Self {
        // A non-empty domain of unique keys cannot fail validation.
        Self::likert(7, Some(["Strongly disagree", "Neutral", "Strongly agree"]))
            .unwrap_or_default()
    }

    /// Replace the domain, recomputing min, max and neutral.
    pub fn set_values(&mut self, values: Vec<ScaleValue>) -> Result<()> {
        *self = Self::new(values)?;
        Ok(())
    }

    #[must_use]
    pub fn values(&self) -> &[ScaleValue] {
        &self.values
    }

    #[must_use]
    pub fn value_keys(&self) -> Vec<i64> {
        self.values.iter().map(|v| v.key).collect()
    }

    #[must_use]
    pub fn value(&self, key: i64) -> Option<&ScaleValue> {
        self.values.iter().find(|v| v.key == key)
    }

    #[must_use]
    pub fn min_answer(&self) -> i64 {
        self.min_answer
    }

    #[must_use]
    pub fn max_answer(&self) -> i64 {
        self.max_answer
    }

    #[must_use]
    pub fn neutral_answer(&self) -> i64 {
        self.neutral_answer
    }

    #[must_use]
    pub fn is_missing(value: Option<f64>) -> bool {
        value.map_or(true, f64::is_nan)
    }

    /// The opposite extreme of the domain, i.e. the answer least likely to
    /// agree with `value`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn invert_answer(&self, value: f64, biased_towards_max: bool) -> f64 {
        let pivot = if biased_towards_max {
            self.neutral_answer
        } else {
            self.neutral_answer - 1
        };
        if value <= pivot as f64 {
            self.max_answer as f64
        } else {
            self.min_answer as f64
        }
    }

    /// Absolute distance between two answers. A missing side is replaced by
    /// the inversion of the other one.
    pub fn distance(&self, value1: Option<f64>, value2: Option<f64>) -> Result<f64> {
        let (v1, v2) = match (
            value1.filter(|v| !v.is_nan()),
            value2.filter(|v| !v.is_nan()),
        ) {
            (None, None) => {
                return Err(ModelError::InvariantViolation(
                    "both values to distance cannot be missing".to_string(),
                ))
            }
            (Some(v1), None) => (v1, self.invert_answer(v1, true)),
            (None, Some(v2)) => (self.invert_answer(v2, true), v2),
            (Some(v1), Some(v2)) => (v1, v2),
        };
        Ok((v1 - v2).abs())
    }

    /// Classify how `value1` (usually the voter's) relates to `value2`.
    pub fn match_values(
        &self,
        value1: Option<f64>,
        value2: Option<f64>,
        strict: bool,
        allow_opinion_unknown: bool,
    ) -> Result<AgreementType> {
        if allow_opinion_unknown && value1.is_none() {
            return Ok(AgreementType::OpinionUnknown);
        }

        let dist = self.distance(value1, value2)?;

        if strict {
            return Ok(if dist == 0.0 {
                AgreementType::Agree
            } else {
                AgreementType::Disagree
            });
        }

        Ok(if dist == 0.0 || dist == 1.0 {
            AgreementType::MostlyAgree
        } else {
            AgreementType::StronglyDisagree
        })
    }

    pub fn agrees(&self, value1: Option<f64>, value2: Option<f64>) -> Result<bool> {
        Ok(self.match_values(value1, value2, true, true)? == AgreementType::Agree)
    }

    pub fn disagrees(&self, value1: Option<f64>, value2: Option<f64>) -> Result<bool> {
        Ok(self.match_values(value1, value2, true, true)? == AgreementType::Disagree)
    }

    pub fn mostly_agrees(&self, value1: Option<f64>, value2: Option<f64>) -> Result<bool> {
        Ok(self.match_values(value1, value2, false, true)? == AgreementType::MostlyAgree)
    }

    pub fn strongly_disagrees(&self, value1: Option<f64>, value2: Option<f64>) -> Result<bool> {
        Ok(self.match_values(value1, value2, false, true)? == AgreementType::StronglyDisagree)
    }

    pub fn has_opinion_unknown(&self, value1: Option<f64>) -> Result<bool> {
        Ok(self.match_values(value1, None, false, true)? == AgreementType::OpinionUnknown)
    }

    pub fn matches_agreement_type(
        &self,
        value1: Option<f64>,
        value2: Option<f64>,
        kind: AgreementType,
    ) -> Result<bool> {
        match kind {
            AgreementType::Agree => self.agrees(value1, value2),
            AgreementType::Disagree => self.disagrees(value1, value2),
            AgreementType::MostlyAgree => self.mostly_agrees(value1, value2),
            AgreementType::StronglyDisagree => self.strongly_disagrees(value1, value2),
            AgreementType::OpinionUnknown => self.has_opinion_unknown(value1),
        }
    }

    /// Map `value` linearly from `[min, max]` to `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn normalize(&self, value: f64) -> f64 {
        let span = (self.max_answer - self.min_answer) as f64;
        if span == 0.0 {
            return 0.5;
        }
        (value - self.min_answer as f64) / span
    }
}

impl Default for NumericScale {
    /// Unlabelled five-point scale.
    fn default() -> Self {
        let values = (1..=5).map(ScaleValue::new).collect::<Vec<_>>();
        Self {
            values,
            min_answer: 1,
            max_answer: 5,
            neutral_answer: 3,
        }
    }
}

impl TryFrom<Vec<ScaleValue>> for NumericScale {
    type Error = ModelError;

    fn try_from(values: Vec<ScaleValue>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<NumericScale> for Vec<ScaleValue> {
    fn from(scale: NumericScale) -> Self {
        scale.values
    }
}

/// Options of a preference-order question. Answers rank option keys, most
/// preferred first; for projection they expand into one value per option
/// pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ScaleValue>", into = "Vec<ScaleValue>")]
pub struct PreferenceScale {
    options: Vec<ScaleValue>,
}

impl PreferenceScale {
    pub fn new(options: Vec<ScaleValue>) -> Result<Self> {
        Ok(Self {
            options: sorted_domain(options)?,
        })
    }

    #[must_use]
    pub fn options(&self) -> &[ScaleValue] {
        &self.options
    }

    /// Number of option pairs, `n(n-1)/2`.
    #[must_use]
    pub fn pairwise_len(&self) -> usize {
        let n = self.options.len();
        n * n.saturating_sub(1) / 2
    }

    #[must_use]
    pub fn is_missing(ranking: Option<&[f64]>) -> bool {
        ranking.map_or(true, <[f64]>::is_empty)
    }

    /// For every pair `(i, j)` with `i < j` in key order: 1 when option `i` is
    /// ranked before option `j`, 0 when after, 0.5 when either is unranked.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pairwise(&self, ranking: &[f64]) -> Vec<f64> {
        let rank_of = |key: i64| ranking.iter().position(|k| *k == key as f64);
        let mut out = Vec::with_capacity(self.pairwise_len());
        for (i, a) in self.options.iter().enumerate() {
            for b in &self.options[i + 1..] {
                let value = match (rank_of(a.key), rank_of(b.key)) {
                    (Some(ra), Some(rb)) if ra < rb => 1.0,
                    (Some(_), Some(_)) => 0.0,
                    _ => 0.5,
                };
                out.push(value);
            }
        }
        out
    }

    #[must_use]
    pub fn neutral_pairwise(&self) -> Vec<f64> {
        vec![0.5; self.pairwise_len()]
    }
}

impl TryFrom<Vec<ScaleValue>> for PreferenceScale {
    type Error = ModelError;

    fn try_from(options: Vec<ScaleValue>) -> Result<Self> {
        Self::new(options)
    }
}

impl From<PreferenceScale> for Vec<ScaleValue> {
    fn from(scale: PreferenceScale) -> Self {
        scale.options
    }
}
