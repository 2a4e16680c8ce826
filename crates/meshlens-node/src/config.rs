//! Node configuration
//!
//! One JSON file carries the decoder, analysis and logging sections. Every
//! field has a default, so an empty object is a valid configuration.

use meshlens_core::{AnalysisConfig, LogFormat, LogLevel, LoggingConfig, MeshlensError};
use meshlens_meshtastic::DecoderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshlensConfig {
    /// Channel keys and duplicate suppression
    #[serde(default)]
    pub decoder: DecoderConfig,

    /// Analysis window and routing staleness
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// File holding learned channel name/slot mappings
    #[serde(default)]
    pub channel_store: Option<PathBuf>,
}

impl MeshlensConfig {
    /// Read a configuration file
    pub fn load(path: &Path) -> Result<Self, MeshlensError> {
        if !path.exists() {
            return Err(MeshlensError::ConfigNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings serde cannot
    pub fn validate(&self) -> Result<(), MeshlensError> {
        self.decoder
            .validate()
            .map_err(|e| MeshlensError::InvalidConfig(e.to_string()))?;
        if self.analysis.max_hops == 0 {
            return Err(MeshlensError::InvalidConfig(
                "analysis.max_hops must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`MeshlensConfig`]
#[derive(Debug, Default)]
pub struct MeshlensConfigBuilder {
    config: MeshlensConfig,
}

impl MeshlensConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a base64 channel key
    pub fn channel_key(mut self, channel: impl Into<String>, key_b64: impl Into<String>) -> Self {
        self.config
            .decoder
            .channel_keys
            .insert(channel.into(), key_b64.into());
        self
    }

    /// Enable or disable duplicate suppression
    pub fn dedup(mut self, enabled: bool) -> Self {
        self.config.decoder.enable_dedup = enabled;
        self
    }

    /// History window for analysis
    pub fn window(mut self, window: Duration) -> Self {
        self.config.analysis.window = window;
        self
    }

    /// Age after which routing edges count as stale
    pub fn stale_edge_after(mut self, age: Duration) -> Self {
        self.config.analysis.stale_edge_after = age;
        self
    }

    pub fn max_hops(mut self, hops: usize) -> Self {
        self.config.analysis.max_hops = hops;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    /// Persist learned channel mappings to this file
    pub fn channel_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.channel_store = Some(path.into());
        self
    }

    pub fn build(self) -> MeshlensConfig {
        self.config
    }
}
