//! Error types for Whistle

use thiserror::Error;

/// Result type alias for Whistle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Whistle operations
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load or run the embedding model
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The vector store rejected or failed an operation
    #[error("store error: {0}")]
    Store(String),

    /// A remote endpoint was unreachable or refused our credentials
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// The language model call failed
    #[error("llm error: {0}")]
    Llm(String),

    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Collection or document not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for failures that mean the remote side could not be reached.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity(_))
    }
}
