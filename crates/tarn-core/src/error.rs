//! Error types for tarn

use thiserror::Error;

/// Core error type for pool and connection operations
#[derive(Error, Debug)]
pub enum TarnError {
    /// The factory could not open a physical connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Too many bad connections were encountered while acquiring
    #[error("Pool exhausted: {0}")]
    Exhausted(String),

    /// A candidate connection failed its validity check
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rolling back uncommitted work failed
    #[error("Rollback error: {0}")]
    Rollback(String),

    /// The pooled connection was released, reclaimed or reset
    #[error("Connection is invalid")]
    InvalidConnection,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for TarnError {
    fn from(err: toml::de::Error) -> Self {
        TarnError::Configuration(err.to_string())
    }
}

/// Result type alias for tarn operations
pub type Result<T> = std::result::Result<T, TarnError>;
