use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Projector '{0}' cannot place entities directly")]
    PredictUnsupported(String),

    #[error("Projection cancelled")]
    Cancelled,

    #[error("Projection failed: {0}")]
    Computation(String),
}
