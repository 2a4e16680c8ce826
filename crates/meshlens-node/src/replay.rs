//! Capture replay through the decode pipeline

use anyhow::{Context, Result};
use meshlens_core::NormalizedEvent;
use meshlens_meshtastic::{ChannelRegistry, MeshtasticPipeline, PersistCallback};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capture::CaptureRecord;
use crate::config::MeshlensConfig;
use crate::persist::ChannelMap;

/// Outcome of one replay
#[derive(Debug, Default)]
pub struct ReplayOutput {
    pub events: Vec<NormalizedEvent>,
    /// Records whose hex payload could not be read
    pub skipped: usize,
    /// Records dropped as duplicates
    pub duplicates: usize,
}

/// Build a pipeline with a registry seeded from stored mappings
pub fn build_pipeline(
    config: &MeshlensConfig,
    known_channels: ChannelMap,
    persist: Option<PersistCallback>,
) -> Result<MeshtasticPipeline> {
    let registry = match persist {
        Some(callback) => ChannelRegistry::with_persistence(callback),
        None => ChannelRegistry::new(),
    };
    registry.load(known_channels);
    MeshtasticPipeline::with_registry(&config.decoder, Arc::new(registry))
        .context("invalid decoder configuration")
}

/// Run every record through the pipeline
///
/// Records without their own receive time are stamped with `now_ms`.
pub fn replay(
    pipeline: &MeshtasticPipeline,
    records: &[CaptureRecord],
    now_ms: i64,
) -> ReplayOutput {
    let mut output = ReplayOutput::default();
    for (index, record) in records.iter().enumerate() {
        let bytes = match record.payload() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(record = index, "Skipping capture record: {:#}", e);
                output.skipped += 1;
                continue;
            }
        };
        let received_at = record.received_at_ms.unwrap_or(now_ms);
        match pipeline.ingest_at(&record.topic, &bytes, received_at) {
            Some(event) => {
                debug!(
                    node = %event.from,
                    kind = event.kind.label(),
                    packet_id = event.packet_id,
                    "Decoded"
                );
                output.events.push(event);
            }
            None => output.duplicates += 1,
        }
    }

    let stats = pipeline.stats();
    info!(
        records = records.len(),
        events = output.events.len(),
        decrypted = stats.decrypted,
        failures = stats.failures(),
        duplicates = output.duplicates,
        "Replay finished"
    );
    output
}

/// Latest event time, the natural "now" for analysing a capture
pub fn latest_timestamp(events: &[NormalizedEvent]) -> Option<i64> {
    events.iter().map(|e| e.timestamp_ms).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlens_meshtastic::fixtures::PacketBuilder;

    #[test]
    fn test_replay_counts_skips_and_duplicates() {
        let pipeline = build_pipeline(&MeshlensConfig::default(), ChannelMap::new(), None).unwrap();
        let packet = PacketBuilder::text(1, "hi").id(77).rx_time(1_000).build_encrypted();
        let records = vec![
            CaptureRecord::new("", &packet),
            CaptureRecord::new("", &packet),
            CaptureRecord {
                topic: String::new(),
                payload_hex: "not hex".to_string(),
                received_at_ms: None,
            },
        ];
        let output = replay(&pipeline, &records, 0);
        assert_eq!(output.events.len(), 1);
        assert_eq!(output.duplicates, 1);
        assert_eq!(output.skipped, 1);
        assert_eq!(latest_timestamp(&output.events), Some(1_000_000));
    }

    #[test]
    fn test_record_time_used_without_rx_time() {
        let pipeline = build_pipeline(&MeshlensConfig::default(), ChannelMap::new(), None).unwrap();
        let packet = PacketBuilder::text(1, "hi").build_encrypted();
        let output = replay(&pipeline, &[CaptureRecord::new("", &packet).at(42)], 0);
        assert_eq!(output.events[0].timestamp_ms, 42);
    }

    #[test]
    fn test_known_channels_seed_registry() {
        let mut known = ChannelMap::new();
        known.insert("Ops".to_string(), 31);
        let pipeline = build_pipeline(&MeshlensConfig::default(), known, None).unwrap();
        assert_eq!(pipeline.registry().lookup_name(31).as_deref(), Some("Ops"));
    }
}
