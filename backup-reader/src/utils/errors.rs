//! Custom error types for the backup reader.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    /// Unsupported manifest revision or cipher, or a missing password.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Seek or read outside the bounds of a stream.
    #[error("Range error: {0}")]
    Range(String),

    #[error("Member not found: {0}")]
    NotFound(String),

    #[error("Archive error: {0}")]
    Archive(String),

    /// Requested archive path is outside every registered backup directory.
    #[error("Invalid archive path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<ReaderError> for io::Error {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::Io(e) => e,
            ReaderError::Range(_) | ReaderError::InvalidPath(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            ReaderError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
