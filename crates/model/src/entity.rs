use crate::answer::{deserialize_answer_map, Answer};
use crate::question::Question;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type CandidateDict = BTreeMap<String, Candidate>;
pub type PartyDict = BTreeMap<String, Party>;
pub type ConstituencyDict = BTreeMap<String, Constituency>;
pub type MunicipalityDict = BTreeMap<String, Municipality>;
pub type CategoryDict = BTreeMap<String, Category>;

/// Anything that can answer a question: candidates directly, parties
/// through the question's party averages.
pub trait AnswerSource {
    fn answer<'a>(&'a self, question: &'a Question) -> Option<&'a Answer>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub party_id: String,
    /// Free-form properties usable by exact-match filters.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_answer_map")]
    pub answers: BTreeMap<String, Answer>,
    /// `None` until a filter has been applied.
    #[serde(skip)]
    pub filtered_out: Option<bool>,
    #[serde(skip)]
    filter_verdicts: BTreeMap<String, bool>,
    #[serde(skip)]
    pub score: Option<f64>,
    #[serde(skip)]
    pub proj_x: Option<f64>,
    #[serde(skip)]
    pub proj_y: Option<f64>,
    /// Too many missing answers to be trusted, but not culled.
    #[serde(skip)]
    pub missing: bool,
}

impl Candidate {
    #[must_use]
    pub fn new(id: impl Into<String>, party_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            party_id: party_id.into(),
            attributes: BTreeMap::new(),
            answers: BTreeMap::new(),
            filtered_out: None,
            filter_verdicts: BTreeMap::new(),
            score: None,
            proj_x: None,
            proj_y: None,
            missing: false,
        }
    }

    #[must_use]
    pub fn with_answer(mut self, question_id: impl Into<String>, answer: impl Into<Answer>) -> Self {
        self.answers.insert(question_id.into(), answer.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn answer_by_id(&self, question_id: &str) -> Option<&Answer> {
        self.answers.get(question_id)
    }

    /// Record whether `filter` let this candidate through. `filtered_out`
    /// becomes true iff any recorded filter excluded the candidate.
    pub fn record_filter_verdict(&mut self, filter: &str, passed: bool) {
        self.filter_verdicts.insert(filter.to_string(), passed);
        self.filtered_out = Some(self.filter_verdicts.values().any(|passed| !passed));
    }

    pub fn reset_filter_state(&mut self) {
        self.filter_verdicts.clear();
        self.filtered_out = None;
    }

    pub fn clear_projection(&mut self) {
        self.score = None;
        self.proj_x = None;
        self.proj_y = None;
    }
}

impl AnswerSource for Candidate {
    fn answer<'a>(&'a self, question: &'a Question) -> Option<&'a Answer> {
        self.answers.get(&question.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    #[serde(skip)]
    pub score: Option<f64>,
    #[serde(skip)]
    pub proj_x: Option<f64>,
    #[serde(skip)]
    pub proj_y: Option<f64>,
}

impl Party {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            abbreviation: String::new(),
            score: None,
            proj_x: None,
            proj_y: None,
        }
    }
}

impl AnswerSource for Party {
    fn answer<'a>(&'a self, question: &'a Question) -> Option<&'a Answer> {
        question.party_average(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituency {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// All candidates standing, including those who never answered.
    #[serde(default)]
    pub total_candidates: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub constituency_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order: i64,
}
