use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How two answers to the same numeric question relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgreementType {
    Agree,
    Disagree,
    OpinionUnknown,
    /// Within one step of each other
    MostlyAgree,
    /// More than one step apart
    StronglyDisagree,
}

impl AgreementType {
    pub const ALL: [AgreementType; 5] = [
        AgreementType::Agree,
        AgreementType::Disagree,
        AgreementType::OpinionUnknown,
        AgreementType::MostlyAgree,
        AgreementType::StronglyDisagree,
    ];

    /// Getter name used in rule configuration and persisted filter state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agree => "agree",
            Self::Disagree => "disagree",
            Self::OpinionUnknown => "opinionUnknown",
            Self::MostlyAgree => "mostlyAgree",
            Self::StronglyDisagree => "stronglyDisagree",
        }
    }
}

impl fmt::Display for AgreementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgreementType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ModelError::UnknownAgreementType(s.to_string()))
    }
}
