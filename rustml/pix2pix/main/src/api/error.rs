//! Error types for the Pix2Pix model crate

use rustml_grad::GradError;
use thiserror::Error;

/// Result type for model, data and training operations
pub type Pix2PixResult<T> = Result<T, Pix2PixError>;

#[derive(Error, Debug)]
pub enum Pix2PixError {
    #[error("Tensor error: {0}")]
    Grad(#[from] GradError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Input not set: call set_input before {0}")]
    InputNotSet(&'static str),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
