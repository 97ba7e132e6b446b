use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Malformed input at row {row}: {message}")]
    MalformedInput { row: u64, message: String },

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Shape mismatch: {records} records but {vectors} vectors")]
    ShapeMismatch { records: usize, vectors: usize },

    #[error("Serialization failed: {0}")]
    SerializationFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Batch(Box<BatchFailure>),
}

impl Error {
    /// The taxonomy variant underneath any batch context.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Batch(failure) => failure.source.root_cause(),
            other => other,
        }
    }

    pub fn batch(&self) -> Option<&BatchFailure> {
        match self {
            Self::Batch(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Context attached to a failure raised while a batch was in flight.
///
/// Enough to replay the batch in isolation: its 1-based index, the source
/// row of each record, and each record's text length in characters.
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub size: usize,
    pub rows: Vec<u64>,
    pub text_lengths: Vec<usize>,
    pub source: Error,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.rows.first().copied().unwrap_or_default();
        let last = self.rows.last().copied().unwrap_or_default();
        write!(f, "batch {} ({} records, rows {}..={}) failed: {}", self.index, self.size, first, last, self.source)
    }
}

impl std::error::Error for BatchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { Some(&self.source) }
}

pub type Result<T> = std::result::Result<T, Error>;
