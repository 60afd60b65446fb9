//! Error types for imgpress

use thiserror::Error;

use crate::pixel::Dimensions;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("bit reader ran out of data")]
    OutOfData,

    #[error("bit sequence matches no huffman code")]
    InvalidCode,

    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        expected: Dimensions,
        actual: Dimensions,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl CompressError {
    /// Folds bit-level decode failures into `CorruptStream` at codec boundaries.
    pub(crate) fn into_corrupt(self, context: &str) -> Self {
        match self {
            Self::OutOfData => Self::CorruptStream(format!("{context}: truncated")),
            Self::InvalidCode => Self::CorruptStream(format!("{context}: invalid huffman code")),
            Self::IoError(e) => Self::CorruptStream(format!("{context}: {e}")),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompressError>;
