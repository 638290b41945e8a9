use crate::agreement::AgreementType;
use crate::answer::Answer;
use crate::error::{ModelError, Result};
use crate::scale::{NumericScale, PreferenceScale};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type QuestionDict = BTreeMap<String, Question>;

/// What a question asks for. Agreement and distance are only defined for
/// [`QuestionKind::Numeric`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QuestionKind {
    Numeric {
        #[serde(default)]
        values: NumericScale,
    },
    PreferenceOrder {
        options: PreferenceScale,
    },
    /// Informational background question (gender, age, ...). Candidates
    /// answer it, voters do not.
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub party_averages: BTreeMap<String, Answer>,
    #[serde(skip)]
    voter_answer: Option<Answer>,
    #[serde(skip)]
    skipped_by_voter: bool,
}

impl Question {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: QuestionKind) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            category: None,
            order: 0,
            kind,
            party_averages: BTreeMap::new(),
            voter_answer: None,
            skipped_by_voter: false,
        }
    }

    #[must_use]
    pub fn numeric(id: impl Into<String>, values: NumericScale) -> Self {
        Self::new(id, QuestionKind::Numeric { values })
    }

    #[must_use]
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_party_average(mut self, party_id: impl Into<String>, answer: Answer) -> Self {
        self.party_averages.insert(party_id.into(), answer);
        self
    }

    /// Numeric and preference-order questions take voter answers.
    #[must_use]
    pub fn is_answerable(&self) -> bool {
        !matches!(self.kind, QuestionKind::Text)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, QuestionKind::Numeric { .. })
    }

    /// The numeric value domain, or `InvalidState` for other kinds.
    pub fn scale(&self) -> Result<&NumericScale> {
        match &self.kind {
            QuestionKind::Numeric { values } => Ok(values),
            _ => Err(ModelError::InvalidState(format!(
                "question '{}' is not numeric",
                self.id
            ))),
        }
    }

    #[must_use]
    pub fn voter_answer(&self) -> Option<&Answer> {
        self.voter_answer.as_ref()
    }

    /// Scalar view of the voter answer.
    #[must_use]
    pub fn voter_value(&self) -> Option<f64> {
        self.voter_answer.as_ref().and_then(Answer::as_number)
    }

    /// A missing answer, such as an empty ranking, leaves the question
    /// unanswered.
    pub fn set_voter_answer(&mut self, answer: Answer) -> Result<()> {
        self.ensure_answerable()?;
        self.voter_answer = Some(answer).filter(|a| !self.is_missing(Some(a)));
        Ok(())
    }

    pub fn unset_voter_answer(&mut self) {
        self.voter_answer = None;
    }

    #[must_use]
    pub fn skipped_by_voter(&self) -> bool {
        self.skipped_by_voter
    }

    pub fn set_skipped_by_voter(&mut self, skipped: bool) -> Result<()> {
        self.ensure_answerable()?;
        self.skipped_by_voter = skipped;
        Ok(())
    }

    fn ensure_answerable(&self) -> Result<()> {
        if self.is_answerable() {
            Ok(())
        } else {
            Err(ModelError::InvalidState(format!(
                "question '{}' does not take voter answers",
                self.id
            )))
        }
    }

    #[must_use]
    pub fn party_average(&self, party_id: &str) -> Option<&Answer> {
        self.party_averages.get(party_id)
    }

    #[must_use]
    pub fn is_missing(&self, answer: Option<&Answer>) -> bool {
        match &self.kind {
            QuestionKind::Numeric { .. } => {
                NumericScale::is_missing(answer.and_then(Answer::as_number))
            }
            QuestionKind::PreferenceOrder { .. } => {
                PreferenceScale::is_missing(answer.and_then(Answer::as_sequence))
            }
            QuestionKind::Text => answer.map_or(true, |a| a.to_string().trim().is_empty()),
        }
    }

    pub fn inverted_voter_answer(&self, biased_towards_max: bool) -> Result<f64> {
        let scale = self.scale()?;
        let value = self.voter_value().ok_or_else(|| {
            ModelError::InvalidState(format!("no voter answer for question '{}'", self.id))
        })?;
        Ok(scale.invert_answer(value, biased_towards_max))
    }

    pub fn distance(&self, value1: Option<&Answer>, value2: Option<&Answer>) -> Result<f64> {
        self.scale()?
            .distance(value1.and_then(Answer::as_number), value2.and_then(Answer::as_number))
    }

    pub fn match_answers(
        &self,
        value1: Option<&Answer>,
        value2: Option<&Answer>,
        strict: bool,
    ) -> Result<AgreementType> {
        self.scale()?.match_values(
            value1.and_then(Answer::as_number),
            value2.and_then(Answer::as_number),
            strict,
            true,
        )
    }

    pub fn matches_agreement_type(
        &self,
        value1: Option<&Answer>,
        value2: Option<&Answer>,
        kind: AgreementType,
    ) -> Result<bool> {
        self.scale()?.matches_agreement_type(
            value1.and_then(Answer::as_number),
            value2.and_then(Answer::as_number),
            kind,
        )
    }

    /// Number of projection dimensions this question contributes.
    #[must_use]
    pub fn mapping_width(&self) -> usize {
        match &self.kind {
            QuestionKind::Numeric { .. } => 1,
            QuestionKind::PreferenceOrder { options } => options.pairwise_len(),
            QuestionKind::Text => 0,
        }
    }

    /// Normalised projection values for a present answer.
    pub fn normalize_answer(&self, answer: &Answer) -> Result<Vec<f64>> {
        match &self.kind {
            QuestionKind::Numeric { values } => {
                let value = answer.as_number().ok_or_else(|| self.parse_error(answer))?;
                Ok(vec![values.normalize(value)])
            }
            QuestionKind::PreferenceOrder { options } => {
                let ranking = answer.as_sequence().ok_or_else(|| self.parse_error(answer))?;
                Ok(options.pairwise(ranking))
            }
            QuestionKind::Text => Err(ModelError::InvalidState(format!(
                "question '{}' is not answerable",
                self.id
            ))),
        }
    }

    /// Normalised projection values of the neutral answer.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn neutral_vector(&self) -> Vec<f64> {
        match &self.kind {
            QuestionKind::Numeric { values } => {
                vec![values.normalize(values.neutral_answer() as f64)]
            }
            QuestionKind::PreferenceOrder { options } => options.neutral_pairwise(),
            QuestionKind::Text => Vec::new(),
        }
    }

    /// Serialised form used for persistence: plain decimal for numbers,
    /// comma-joined keys for rankings.
    #[must_use]
    pub fn answer_to_string(answer: &Answer) -> String {
        answer.to_string()
    }

    pub fn parse_answer(&self, raw: &str) -> Result<Answer> {
        let raw = raw.trim();
        match &self.kind {
            QuestionKind::Numeric { .. } => raw
                .parse::<f64>()
                .ok()
                .filter(|v| !v.is_nan())
                .map(Answer::Number)
                .ok_or_else(|| self.parse_error(&Answer::Text(raw.to_string()))),
            QuestionKind::PreferenceOrder { .. } => raw
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| part.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Answer::Sequence)
                .map_err(|_| self.parse_error(&Answer::Text(raw.to_string()))),
            QuestionKind::Text => Ok(Answer::Text(raw.to_string())),
        }
    }

    fn parse_error(&self, answer: &Answer) -> ModelError {
        ModelError::Parse {
            question: self.id.clone(),
            value: answer.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScaleValue;
    use pretty_assertions::assert_eq;

    fn likert(id: &str) -> Question {
        Question::numeric(id, NumericScale::default())
    }

    #[test]
    fn deserializes_tagged_kinds() {
        let questions: QuestionDict = serde_json::from_str(
            r#"{
                "q1": {"type": "numeric", "text": "Raise taxes?", "order": 2},
                "q2": {"type": "preferenceOrder", "options": [{"key": 1}, {"key": 2}, {"key": 3}]},
                "gender": {"type": "text"}
            }"#,
        )
        .unwrap();
        assert_eq!(questions["q1"].scale().unwrap().max_answer(), 5);
        assert_eq!(questions["q2"].mapping_width(), 3);
        assert!(!questions["gender"].is_answerable());
    }

    #[test]
    fn voter_answers_only_on_answerable_questions() {
        let mut text = Question::new("gender", QuestionKind::Text);
        assert!(matches!(
            text.set_voter_answer(Answer::Number(1.0)),
            Err(ModelError::InvalidState(_))
        ));
        let mut q = likert("q1");
        q.set_voter_answer(Answer::Number(4.0)).unwrap();
        assert_eq!(q.voter_value(), Some(4.0));
        q.unset_voter_answer();
        assert_eq!(q.voter_answer(), None);
    }

    #[test]
    fn empty_rankings_leave_the_question_unanswered() {
        let mut pref = Question::new(
            "pref",
            QuestionKind::PreferenceOrder {
                options: PreferenceScale::new(vec![ScaleValue::new(1), ScaleValue::new(2)])
                    .unwrap(),
            },
        );
        pref.set_voter_answer(Answer::Sequence(vec![2.0, 1.0])).unwrap();
        assert!(pref.voter_answer().is_some());

        pref.set_voter_answer(Answer::Sequence(Vec::new())).unwrap();
        assert_eq!(pref.voter_answer(), None);
        let restored = pref.parse_answer("").unwrap();
        pref.set_voter_answer(restored).unwrap();
        assert_eq!(pref.voter_answer(), None);
    }

    #[test]
    fn agreement_fails_for_non_numeric_kinds() {
        let pref = Question::new(
            "pref",
            QuestionKind::PreferenceOrder {
                options: PreferenceScale::new(vec![ScaleValue::new(1), ScaleValue::new(2)])
                    .unwrap(),
            },
        );
        let one = Answer::Number(1.0);
        assert!(matches!(
            pref.distance(Some(&one), Some(&one)),
            Err(ModelError::InvalidState(_))
        ));
    }

    #[test]
    fn inverted_voter_answer_requires_an_answer() {
        let mut q = likert("q1");
        assert!(q.inverted_voter_answer(true).is_err());
        q.set_voter_answer(Answer::Number(2.0)).unwrap();
        assert_eq!(q.inverted_voter_answer(true).unwrap(), 5.0);
    }

    #[test]
    fn missing_answers_by_kind() {
        let q = likert("q1");
        assert!(q.is_missing(None));
        assert!(q.is_missing(Some(&Answer::Number(f64::NAN))));
        assert!(q.is_missing(Some(&Answer::Text("n/a".into()))));
        assert!(!q.is_missing(Some(&Answer::Number(2.0))));
    }

    #[test]
    fn persisted_answers_round_trip_as_plain_decimals() {
        let q = likert("q1");
        let answer = q.parse_answer("4").unwrap();
        assert_eq!(answer, Answer::Number(4.0));
        assert_eq!(Question::answer_to_string(&answer), "4");
        assert!(q.parse_answer("four").is_err());

        let pref = Question::new(
            "pref",
            QuestionKind::PreferenceOrder {
                options: PreferenceScale::new(vec![ScaleValue::new(1), ScaleValue::new(2)])
                    .unwrap(),
            },
        );
        assert_eq!(
            pref.parse_answer("2,1").unwrap(),
            Answer::Sequence(vec![2.0, 1.0])
        );
    }

    #[test]
    fn normalized_answers() {
        let q = likert("q1");
        assert_eq!(q.normalize_answer(&Answer::Number(2.0)).unwrap(), vec![0.25]);
        assert_eq!(q.neutral_vector(), vec![0.5]);
    }
}
