//! Configuration types for the decode pipeline
//!
//! Wire constants (port numbers, the public channel key, default channel
//! names) live here next to the runtime settings that refer to them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{DecodeError, Result};

/// Base64 form of the well-known public channel key
pub const DEFAULT_CHANNEL_KEY_B64: &str = "1PG7OiApB1nwvP+rz05pAQ==";

/// Channel names that use the public key unless another key is registered
pub const DEFAULT_CHANNEL_NAMES: &[&str] = &[
    "LongFast",
    "LongSlow",
    "LongModerate",
    "LongTurbo",
    "MediumFast",
    "MediumSlow",
    "ShortFast",
    "ShortSlow",
    "ShortTurbo",
];

/// Length of an expanded channel key (AES-256)
pub const CHANNEL_KEY_LEN: usize = 32;

/// Quarter-dB value meaning "SNR unknown" in route traces
pub const SNR_UNKNOWN_QUARTER_DB: i32 = -128;

// Port numbers (portnums.proto)
pub const PORT_TEXT_MESSAGE: i32 = 1;
pub const PORT_POSITION: i32 = 3;
pub const PORT_NODEINFO: i32 = 4;
pub const PORT_ROUTING: i32 = 5;
pub const PORT_TELEMETRY: i32 = 67;
pub const PORT_TRACEROUTE: i32 = 70;
pub const PORT_NEIGHBORINFO: i32 = 71;
pub const PORT_MAP_REPORT: i32 = 73;

/// Default deduplication cache capacity
pub const DEFAULT_DEDUP_CACHE_SIZE: usize = 10_000;

/// Default deduplication window
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(600);

/// Decode pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Extra channel keys, channel name to base64 key
    #[serde(default)]
    pub channel_keys: BTreeMap<String, String>,

    /// Suppress packets already seen from another gateway
    #[serde(default = "default_true")]
    pub enable_dedup: bool,

    /// Deduplication cache capacity
    #[serde(default = "default_dedup_cache_size")]
    pub dedup_cache_size: usize,

    /// How long a packet id stays in the deduplication cache
    #[serde(
        with = "meshlens_core::config::humantime_serde",
        default = "default_dedup_ttl"
    )]
    pub dedup_ttl: Duration,
}

fn default_true() -> bool {
    true
}

fn default_dedup_cache_size() -> usize {
    DEFAULT_DEDUP_CACHE_SIZE
}

fn default_dedup_ttl() -> Duration {
    DEFAULT_DEDUP_TTL
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            channel_keys: BTreeMap::new(),
            enable_dedup: true,
            dedup_cache_size: DEFAULT_DEDUP_CACHE_SIZE,
            dedup_ttl: DEFAULT_DEDUP_TTL,
        }
    }
}

impl DecoderConfig {
    /// Validate settings that serde cannot check
    pub fn validate(&self) -> Result<()> {
        if self.enable_dedup && self.dedup_cache_size == 0 {
            return Err(DecodeError::InvalidConfig(
                "dedup_cache_size must be non-zero when dedup is enabled".to_string(),
            ));
        }
        if let Some(name) = self.channel_keys.keys().find(|name| name.is_empty()) {
            return Err(DecodeError::InvalidConfig(format!(
                "channel key registered under empty name {name:?}"
            )));
        }
        Ok(())
    }
}

/// Builder for DecoderConfig
#[derive(Debug, Default)]
pub struct DecoderConfigBuilder {
    config: DecoderConfig,
}

impl DecoderConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a base64 channel key
    pub fn channel_key(mut self, channel: impl Into<String>, key_b64: impl Into<String>) -> Self {
        self.config
            .channel_keys
            .insert(channel.into(), key_b64.into());
        self
    }

    /// Enable or disable duplicate suppression
    pub fn dedup(mut self, enabled: bool) -> Self {
        self.config.enable_dedup = enabled;
        self
    }

    /// Set deduplication cache size
    pub fn dedup_cache_size(mut self, size: usize) -> Self {
        self.config.dedup_cache_size = size;
        self
    }

    /// Set deduplication window
    pub fn dedup_ttl(mut self, ttl: Duration) -> Self {
        self.config.dedup_ttl = ttl;
        self
    }

    /// Build the configuration
    pub fn build(self) -> DecoderConfig {
        self.config
    }
}
