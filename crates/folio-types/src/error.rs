use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid format version: {0}")]
    InvalidVersion(String),

    #[error("generation {0} exceeds the maximum of 65535")]
    GenerationOverflow(u32),
}
