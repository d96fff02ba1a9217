use thiserror::Error;

pub type GradResult<T> = Result<T, GradError>;

#[derive(Debug, Error)]
pub enum GradError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid dimension {dim} for tensor with {ndim} dims")]
    InvalidDimension { dim: i64, ndim: usize },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Tape error: {0}")]
    TapeError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
