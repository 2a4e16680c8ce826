//! Error types for topology analysis
//!
//! Graph building, classification and coverage estimation treat missing
//! data as degraded input and never fail. Only routing queries can come up
//! empty.

use meshlens_core::NodeId;
use thiserror::Error;

/// Errors returned by topology queries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    // ===== Routing Errors =====
    /// An endpoint has never been observed in a route trace
    #[error("Node {0} is not in the routing graph")]
    UnknownNode(NodeId),

    /// Both endpoints are known but no observed path joins them
    #[error("No path from {start} to {end}")]
    NoPath {
        /// Query start
        start: NodeId,
        /// Query end
        end: NodeId,
    },

    // ===== Output Errors =====
    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TopologyError {
    /// Check if this is a routing "not found" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TopologyError::UnknownNode(_) | TopologyError::NoPath { .. }
        )
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            TopologyError::UnknownNode(_) => "UNKNOWN_NODE",
            TopologyError::NoPath { .. } => "NO_PATH",
            TopologyError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        TopologyError::Serialization(err.to_string())
    }
}

/// Result type alias for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;
