//! Error types for the shakestream service.

use crate::spectral::SpectralError;
use std::error::Error as StdError;
use std::fmt;
use std::result;

/// A specialized Result type for shakestream operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for shakestream operations.
#[derive(Debug)]
pub enum Error {
    /// Storage backend errors
    Storage(String),
    /// Configuration errors
    Config(String),
    /// I/O errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Validation errors
    Validation(String),
    /// Spectral analysis precondition violations
    Analysis(SpectralError),
    /// A bounded operation did not finish in time
    Timeout(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::Analysis(err) => write!(f, "Analysis error: {}", err),
            Error::Timeout(msg) => write!(f, "Timed out: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Analysis(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<SpectralError> for Error {
    fn from(err: SpectralError) -> Self {
        Error::Analysis(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}
