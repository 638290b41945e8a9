use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use votematch_filter::{
    ExactMatchFilter, Filter, LogicOperator, QuestionAgreementFilter, RangeFilter, ValueSource,
};

/// Orchestrator settings. Every field has a default, so a partial TOML file
/// only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub use_correlation_matrices: bool,
    pub use_question_categories: bool,
    /// Treat each municipality as its own constituency.
    pub use_municipality_as_constituency: bool,
    /// Candidates missing more answers than this are dropped. Negative
    /// disables the ceiling.
    pub max_missing_vals: i64,
    /// Candidates missing more answers than this are flagged `missing`.
    /// Negative disables the ceiling.
    pub nonmissing_candidate_max_missing_vals: i64,
    pub min_vals_for_mapping: usize,
    pub min_participation_fraction: f64,
    pub min_participation_number: usize,
    pub projection_method: String,
    /// Sent along with session statistics.
    pub locale: String,
    pub filters: Vec<FilterSpec>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            use_correlation_matrices: true,
            use_question_categories: true,
            use_municipality_as_constituency: false,
            max_missing_vals: 10,
            nonmissing_candidate_max_missing_vals: 9,
            min_vals_for_mapping: 0,
            min_participation_fraction: 0.3,
            min_participation_number: 6,
            projection_method: "Manhattan".to_string(),
            locale: "en".to_string(),
            filters: default_filters(),
        }
    }
}

impl MatcherConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }
}

/// Declares one filter the matcher builds whenever candidates are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    Agreement {
        name: String,
    },
    Range {
        name: String,
        source: ValueSource,
    },
    Exact {
        name: String,
        source: ValueSource,
        /// Set when candidate values are lists.
        #[serde(default)]
        multiple_values: Option<LogicOperator>,
    },
}

impl FilterSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Agreement { name } | Self::Range { name, .. } | Self::Exact { name, .. } => name,
        }
    }

    /// An empty filter; the matcher scans values and wires getters.
    #[must_use]
    pub fn build(&self) -> Filter {
        match self {
            Self::Agreement { name } => QuestionAgreementFilter::new(name.clone()).into(),
            Self::Range { name, source } => RangeFilter::new(name.clone(), source.clone()).into(),
            Self::Exact {
                name,
                source,
                multiple_values,
            } => {
                let filter = ExactMatchFilter::new(name.clone(), source.clone());
                match multiple_values {
                    Some(logic) => filter.with_multiple_values(*logic).into(),
                    None => filter.into(),
                }
            }
        }
    }
}

fn default_filters() -> Vec<FilterSpec> {
    vec![
        FilterSpec::Agreement {
            name: "question".to_string(),
        },
        FilterSpec::Range {
            name: "age".to_string(),
            source: ValueSource::Question("age".to_string()),
        },
        FilterSpec::Exact {
            name: "gender".to_string(),
            source: ValueSource::Question("gender".to_string()),
            multiple_values: None,
        },
        FilterSpec::Exact {
            name: "party".to_string(),
            source: ValueSource::Party,
            multiple_values: None,
        },
    ]
}
