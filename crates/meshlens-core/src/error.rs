//! Error types shared across meshlens crates
//!
//! Decode failures are not represented here: they travel as values inside
//! [`crate::event::NormalizedEvent`]. This type covers identity parsing,
//! configuration, and serialization problems.

use thiserror::Error;

/// Main error type for core meshlens operations
#[derive(Error, Debug)]
pub enum MeshlensError {
    // ===== Identity Errors =====
    /// Node identifier could not be parsed
    #[error("Invalid node ID: {0}")]
    InvalidNodeId(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    // ===== Serialization Errors =====
    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshlensError {
    /// Check if this error is a client error (bad input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MeshlensError::InvalidNodeId(_) | MeshlensError::InvalidConfig(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            MeshlensError::InvalidNodeId(_) => "INVALID_NODE_ID",
            MeshlensError::InvalidConfig(_) => "INVALID_CONFIG",
            MeshlensError::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            MeshlensError::Serialization(_) => "SERIALIZATION_ERROR",
            MeshlensError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for core meshlens operations
pub type Result<T> = std::result::Result<T, MeshlensError>;

impl From<serde_json::Error> for MeshlensError {
    fn from(err: serde_json::Error) -> Self {
        MeshlensError::Serialization(err.to_string())
    }
}
