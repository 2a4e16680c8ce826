//! Tracing subscriber setup
//!
//! Logs go to stderr (or a file) so stdout stays clean for JSON output.

use anyhow::{anyhow, Context, Result};
use meshlens_core::{LogFormat, LogLevel, LoggingConfig};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level; `--verbose` raises the
/// configured level to debug.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose && config.level != LogLevel::Trace {
        LogLevel::Debug
    } else {
        config.level
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
