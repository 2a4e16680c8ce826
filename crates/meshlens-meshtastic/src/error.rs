//! Error types for the Meshtastic decode pipeline
//!
//! Decode failures are not propagated out of the pipeline as `Err`; they
//! are folded into a [`NormalizedEvent`](meshlens_core::NormalizedEvent)
//! carrying [`DecodeFailure`]. The error type here is what the individual
//! stages return before that folding happens, plus the configuration and
//! key-registration errors that callers do see directly.

use meshlens_core::DecodeFailure;
use thiserror::Error;

/// Main error type for Meshtastic decode operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    // ===== Wire Errors =====
    /// Outer envelope could not be parsed or has no usable packet
    #[error("Malformed envelope: {0}")]
    EnvelopeMalformed(String),

    /// Port payload did not parse as the message its port number promises
    #[error("Malformed inner data on port {port}: {reason}")]
    InnerDataMalformed {
        /// Port number of the payload
        port: i32,
        /// Parser message
        reason: String,
    },

    // ===== Crypto Errors =====
    /// No key is registered for the channel and it is not a default channel
    #[error("No key for channel: {0}")]
    UnknownChannel(String),

    /// A key was found but the plaintext is not a valid data message
    #[error("Decryption failed on channel {channel}: {reason}")]
    DecryptFailed {
        /// Channel whose key was used
        channel: String,
        /// What the structural check rejected
        reason: String,
    },

    /// Key material is unusable
    #[error("Invalid channel key: {0}")]
    InvalidKey(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DecodeError {
    /// Map to the failure tag recorded on normalized events
    ///
    /// Key and configuration errors never come out of a decode call, but
    /// map to the closest wire failure for completeness.
    pub fn kind(&self) -> DecodeFailure {
        match self {
            DecodeError::EnvelopeMalformed(_) | DecodeError::InvalidConfig(_) => {
                DecodeFailure::EnvelopeMalformed
            }
            DecodeError::InnerDataMalformed { .. } => DecodeFailure::InnerDataMalformed,
            DecodeError::UnknownChannel(_) | DecodeError::InvalidKey(_) => {
                DecodeFailure::UnknownChannel
            }
            DecodeError::DecryptFailed { .. } => DecodeFailure::DecryptFailed,
        }
    }

    /// Check if this error came from bad wire data
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            DecodeError::EnvelopeMalformed(_) | DecodeError::InnerDataMalformed { .. }
        )
    }

    /// Check if this error came from channel key handling
    pub fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            DecodeError::UnknownChannel(_)
                | DecodeError::DecryptFailed { .. }
                | DecodeError::InvalidKey(_)
        )
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            DecodeError::EnvelopeMalformed(_) => "ENVELOPE_MALFORMED",
            DecodeError::InnerDataMalformed { .. } => "INNER_DATA_MALFORMED",
            DecodeError::UnknownChannel(_) => "UNKNOWN_CHANNEL",
            DecodeError::DecryptFailed { .. } => "DECRYPT_FAILED",
            DecodeError::InvalidKey(_) => "INVALID_KEY",
            DecodeError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

impl From<prost::DecodeError> for DecodeError {
    fn from(err: prost::DecodeError) -> Self {
        DecodeError::EnvelopeMalformed(err.to_string())
    }
}

/// Result type alias for decode operations
pub type Result<T> = std::result::Result<T, DecodeError>;
