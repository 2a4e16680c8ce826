//! Meshlens Node - capture replay and analysis harness
//!
//! Library half of the `meshlens` binary: configuration, capture files,
//! channel mapping persistence, logging setup and replay.

pub mod capture;
pub mod config;
pub mod logging;
pub mod persist;
pub mod replay;

pub use capture::{parse_capture, read_capture, write_capture, CaptureRecord};
pub use config::{MeshlensConfig, MeshlensConfigBuilder};
pub use persist::{load_channel_map, spawn_persistence, ChannelMap};
pub use replay::{build_pipeline, latest_timestamp, replay, ReplayOutput};
