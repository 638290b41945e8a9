use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown agreement type: {0}")]
    UnknownAgreementType(String),

    #[error("Invalid value domain: {0}")]
    InvalidDomain(String),

    #[error("Cannot parse answer '{value}' for question '{question}'")]
    Parse { question: String, value: String },
}
