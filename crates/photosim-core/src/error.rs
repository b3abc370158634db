//! Error types for PhotoSim.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The durable medium is unreadable or unwritable.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resizing or inference failed for a single image.
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error means the persistence layer itself is unusable.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
