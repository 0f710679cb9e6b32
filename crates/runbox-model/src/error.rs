use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid runner id '{0}': expected 10-63 lowercase alphanumeric characters")]
    InvalidRunnerId(String),

    #[error("origin is empty")]
    EmptyOrigin,

    #[error("unknown unit phase: {0}")]
    UnknownPhase(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
