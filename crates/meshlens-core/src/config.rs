//! Configuration types shared by the analysis engine and the node binary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default history window fed into topology analysis
pub const DEFAULT_ANALYSIS_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// Age after which a routing edge no longer counts as reliable
pub const DEFAULT_STALE_EDGE_AFTER: Duration = Duration::from_secs(3600);

/// Topology analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// How far back to look when building graphs
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,

    /// Routing edges older than this mark a path as unreliable
    #[serde(with = "humantime_serde", default = "default_stale_edge_after")]
    pub stale_edge_after: Duration,

    /// Hop bound used by path enumeration
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
}

fn default_window() -> Duration {
    DEFAULT_ANALYSIS_WINDOW
}

fn default_stale_edge_after() -> Duration {
    DEFAULT_STALE_EDGE_AFTER
}

fn default_max_hops() -> usize {
    7
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_ANALYSIS_WINDOW,
            stale_edge_after: DEFAULT_STALE_EDGE_AFTER,
            max_hops: 7,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,
    /// Log format
    #[serde(default)]
    pub format: LogFormat,
    /// Log to file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            log_file: None,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by env-filter style parsers
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format
    Json,
}

/// Serde helper for `Duration` fields written as humantime strings ("5m", "1h 30m")
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        s.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
