use thiserror::Error;
use votematch_filter::FilterError;
use votematch_model::ModelError;
use votematch_projection::ProjectionError;

pub type Result<T> = std::result::Result<T, MatcherError>;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Data provider error: {0:#}")]
    DataProvider(anyhow::Error),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(ModelError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),
}

impl From<ModelError> for MatcherError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotFound(msg) => Self::NotFound(msg),
            ModelError::InvalidState(msg) => Self::InvalidState(msg),
            ModelError::InvariantViolation(msg) => Self::InvariantViolation(msg),
            other => Self::Model(other),
        }
    }
}
