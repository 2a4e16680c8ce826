//! Meshlens Core - Shared domain types for mesh telemetry analysis
//!
//! This crate holds the types that cross the boundary between the decode
//! pipeline, the topology engine, and whatever stores or displays their
//! output.
//!
//! # Modules
//!
//! - [`node`] - Node identity (`!xxxxxxxx`) and device roles
//! - [`location`] - Geographic positions and great-circle distance
//! - [`event`] - Normalized events produced by the decode pipeline
//! - [`config`] - Analysis and logging configuration
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust
//! use meshlens_core::{Location, NodeId};
//!
//! let node: NodeId = "!deadbeef".parse().unwrap();
//! assert_eq!(node, NodeId::from(0xDEADBEEF));
//!
//! let a = Location::new(40.0, -105.0);
//! let b = Location::new(40.1, -105.0);
//! assert!(a.distance_km(&b) > 11.0);
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod location;
pub mod node;

pub use config::{AnalysisConfig, LogFormat, LogLevel, LoggingConfig};
pub use error::{MeshlensError, Result};
pub use event::{
    DecodeFailure, DeviceMetrics, EnvironmentMetrics, EventKind, MapReport, NeighborEntry,
    NeighborReport, NodeIdentity, NormalizedEvent, PositionReport, RouteTrace, SignalQuality,
    TelemetryReport,
};
pub use location::Location;
pub use node::{NodeId, NodeRole, BROADCAST_NODE_NUM};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
