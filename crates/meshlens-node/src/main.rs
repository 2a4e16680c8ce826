//! Meshlens - replay captured mesh traffic and analyze it
//!
//! Reads a JSON-lines capture of gateway messages, decodes every record
//! and prints events, a network report or routes as JSON on stdout.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use meshlens_core::NodeId;
use meshlens_meshtastic::MeshtasticPipeline;
use meshlens_topology::{analyze, routing_graph};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use meshlens_node::{
    build_pipeline, latest_timestamp, load_channel_map, logging, read_capture, replay,
    spawn_persistence, ChannelMap, MeshlensConfig, ReplayOutput,
};

#[derive(Parser)]
#[command(name = "meshlens")]
#[command(version, about = "Decode and analyze captured Meshtastic gateway traffic")]
struct Args {
    /// Configuration file (JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one normalized event per line
    Decode {
        /// Capture file (JSON lines)
        capture: PathBuf,
        /// Leave out events that failed to decode
        #[arg(long)]
        skip_errors: bool,
    },
    /// Print the connectivity graph, classification and coverage
    Analyze {
        capture: PathBuf,
        /// Analysis time in ms since epoch (default: latest event)
        #[arg(long)]
        now_ms: Option<i64>,
    },
    /// Print the best route and alternatives between two nodes
    Route {
        capture: PathBuf,
        /// Start node (!hex, 0xhex or decimal)
        #[arg(long)]
        from: NodeId,
        /// End node
        #[arg(long)]
        to: NodeId,
        /// Hop bound for alternatives (default: from config)
        #[arg(long)]
        max_hops: Option<usize>,
        #[arg(long)]
        now_ms: Option<i64>,
    },
}

impl Command {
    fn capture(&self) -> &Path {
        match self {
            Command::Decode { capture, .. }
            | Command::Analyze { capture, .. }
            | Command::Route { capture, .. } => capture,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MeshlensConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MeshlensConfig::default(),
    };
    logging::init_logging(&config.logging, args.verbose)?;

    info!("Starting meshlens {}", meshlens_core::VERSION);

    let output = decode_capture(&config, args.command.capture()).await?;

    match args.command {
        Command::Decode { skip_errors, .. } => {
            for event in output.events.iter().filter(|e| !(skip_errors && e.is_error())) {
                println!("{}", serde_json::to_string(event)?);
            }
        }
        Command::Analyze { now_ms, .. } => {
            let now = analysis_time(now_ms, &output);
            let report = analyze(&output.events, &config.analysis, now);
            println!("{}", report.to_json()?);
        }
        Command::Route {
            from,
            to,
            max_hops,
            now_ms,
            ..
        } => {
            let now = analysis_time(now_ms, &output);
            let graph = routing_graph(&output.events, &config.analysis, now);
            let alternatives =
                graph.enumerate_paths(from, to, max_hops.unwrap_or(config.analysis.max_hops));
            let result = match graph.shortest_path(from, to) {
                Ok(path) => json!({ "best": path, "alternatives": alternatives }),
                Err(e) => {
                    warn!(error_code = e.error_code(), "{}", e);
                    json!({ "best": null, "error": e.to_string(), "alternatives": alternatives })
                }
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

/// Replay the capture, persisting learned channels when configured
async fn decode_capture(config: &MeshlensConfig, capture: &Path) -> Result<ReplayOutput> {
    let records = read_capture(capture).await?;
    info!("Loaded {} capture records from {}", records.len(), capture.display());

    let Some(store) = &config.channel_store else {
        let pipeline = build_pipeline(config, ChannelMap::new(), None)?;
        return Ok(replay(&pipeline, &records, Utc::now().timestamp_millis()));
    };

    let known = load_channel_map(store).await?;
    info!("Loaded {} channel mappings from {}", known.len(), store.display());
    let (callback, writer) = spawn_persistence(store.clone(), known.clone());
    let pipeline: MeshtasticPipeline = build_pipeline(config, known, Some(callback))?;
    let output = replay(&pipeline, &records, Utc::now().timestamp_millis());

    // Dropping the pipeline drops the last callback and lets the writer finish
    drop(pipeline);
    let saved = writer.await.context("channel store writer panicked")?;
    info!("Channel store holds {} mappings", saved.len());
    Ok(output)
}

fn analysis_time(explicit: Option<i64>, output: &ReplayOutput) -> i64 {
    explicit
        .or_else(|| latest_timestamp(&output.events))
        .unwrap_or_else(|| Utc::now().timestamp_millis())
}
