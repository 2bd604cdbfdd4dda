//! Error types shared across Fabrik components

use thiserror::Error;

/// Result type alias for Fabrik operations
pub type Result<T> = std::result::Result<T, FabrikError>;

/// Main error type for Fabrik
#[derive(Error, Debug)]
pub enum FabrikError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
