// Wed Jan 15 2026 - Alex

use crate::memory::MemoryError;
use thiserror::Error;

/// Caller-visible failures of the analysis API.
///
/// Malformed binary data is never an error here; it shows up as an empty
/// or partial result carrying an `RttiStatus`.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Index {index} out of bounds (have {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
