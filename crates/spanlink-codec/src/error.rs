//! Error types for the tagging-scheme codecs.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Label space has not been prepared; call `LabelRegistry::prepare` first")]
    LabelsNotPrepared,

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Batch length mismatch: expected {expected}, got {actual}")]
    BatchLength { expected: usize, actual: usize },

    #[error("Batch mixes labelled and unlabelled features")]
    MixedBatch,

    #[error("Cannot collate an empty batch")]
    EmptyBatch,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<candle_core::Error> for CodecError {
    fn from(e: candle_core::Error) -> Self {
        CodecError::Tensor(e.to_string())
    }
}

impl From<tokenizers::Error> for CodecError {
    fn from(e: tokenizers::Error) -> Self {
        CodecError::Tokenizer(e.to_string())
    }
}

impl CodecError {
    pub(crate) fn shape(expected: impl std::fmt::Debug, actual: impl std::fmt::Debug) -> Self {
        CodecError::ShapeMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }
}
