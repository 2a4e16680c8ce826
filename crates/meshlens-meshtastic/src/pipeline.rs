//! MeshtasticPipeline - raw wire bytes to normalized events
//!
//! Runs one wire message through every decode stage:
//!
//! ```text
//!  (topic, bytes)
//!       │
//!       ▼
//!  decode_envelope ──► channel name (envelope → topic → registry)
//!       │                    │
//!       │                    └──► ChannelRegistry::register
//!       ▼
//!  [dedup check]  (ingest only)
//!       │
//!       ▼
//!  decrypt_packet (ChannelKeyStore)
//!       │
//!       ▼
//!  decode_inner ──► normalize_message ──► NormalizedEvent
//! ```
//!
//! Every stage failure becomes a `DecodeError` event rather than an `Err`,
//! so one bad message never affects the next. The pipeline holds no
//! per-message state; it is shared by reference across threads.

use chrono::Utc;
use meshlens_core::{EventKind, NormalizedEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::{CacheStats, DeduplicationCache};
use crate::config::DecoderConfig;
use crate::crypto::decrypt_packet;
use crate::decoder::decode_inner;
use crate::envelope::{decode_envelope, Envelope, TopicInfo};
use crate::error::{DecodeError, Result};
use crate::keys::ChannelKeyStore;
use crate::normalizer::{normalize_message, PacketContext};
use crate::registry::ChannelRegistry;

/// Pipeline statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Messages that produced a typed event
    pub decoded: u64,
    /// Encrypted messages successfully decrypted
    pub decrypted: u64,
    /// Encrypted messages on channels without a key
    pub unknown_channel: u64,
    /// Messages whose key produced unusable plaintext
    pub decrypt_failed: u64,
    /// Unreadable envelopes or port payloads
    pub malformed: u64,
    /// Messages on ports without a dedicated decoder
    pub raw_passthrough: u64,
    /// Messages dropped by `ingest` as already seen
    pub duplicates: u64,
}

impl PipelineStats {
    /// Total messages that produced an error event
    pub fn failures(&self) -> u64 {
        self.unknown_channel + self.decrypt_failed + self.malformed
    }
}

#[derive(Debug, Default)]
struct Counters {
    decoded: AtomicU64,
    decrypted: AtomicU64,
    unknown_channel: AtomicU64,
    decrypt_failed: AtomicU64,
    malformed: AtomicU64,
    raw_passthrough: AtomicU64,
    duplicates: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &DecodeError) {
        match error {
            DecodeError::UnknownChannel(_) | DecodeError::InvalidKey(_) => {
                Self::bump(&self.unknown_channel)
            }
            DecodeError::DecryptFailed { .. } => Self::bump(&self.decrypt_failed),
            DecodeError::EnvelopeMalformed(_)
            | DecodeError::InnerDataMalformed { .. }
            | DecodeError::InvalidConfig(_) => Self::bump(&self.malformed),
        }
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            decoded: self.decoded.load(Ordering::Relaxed),
            decrypted: self.decrypted.load(Ordering::Relaxed),
            unknown_channel: self.unknown_channel.load(Ordering::Relaxed),
            decrypt_failed: self.decrypt_failed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            raw_passthrough: self.raw_passthrough.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

enum Opened {
    Envelope(Envelope, Option<String>),
    Failed(NormalizedEvent),
}

/// Decode pipeline shared by all inbound messages
#[derive(Debug)]
pub struct MeshtasticPipeline {
    keys: ChannelKeyStore,
    registry: Arc<ChannelRegistry>,
    dedup: Option<DeduplicationCache>,
    counters: Counters,
}

impl MeshtasticPipeline {
    /// Create a pipeline with its own channel registry
    pub fn new(config: &DecoderConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(ChannelRegistry::new()))
    }

    /// Create a pipeline around an existing registry
    ///
    /// The registry is injected so the caller controls its persistence
    /// callback and can share it with other readers.
    pub fn with_registry(config: &DecoderConfig, registry: Arc<ChannelRegistry>) -> Result<Self> {
        config.validate()?;
        let keys = ChannelKeyStore::with_keys(&config.channel_keys)?;
        let dedup = config
            .enable_dedup
            .then(|| DeduplicationCache::from_config(config));

        debug!(
            explicit_keys = config.channel_keys.len(),
            dedup = config.enable_dedup,
            "Created decode pipeline"
        );

        Ok(Self {
            keys,
            registry,
            dedup,
            counters: Counters::default(),
        })
    }

    /// Channel key store
    pub fn keys(&self) -> &ChannelKeyStore {
        &self.keys
    }

    /// Channel name/slot registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Decode one wire message, timestamping with the current clock
    pub fn decode(&self, topic: &str, bytes: &[u8]) -> NormalizedEvent {
        self.decode_at(topic, bytes, Utc::now().timestamp_millis())
    }

    /// Decode one wire message with an explicit receive time
    ///
    /// Always returns an event. Duplicates are not filtered.
    pub fn decode_at(&self, topic: &str, bytes: &[u8], received_at_ms: i64) -> NormalizedEvent {
        match self.open(topic, bytes, received_at_ms) {
            Opened::Failed(event) => event,
            Opened::Envelope(envelope, channel) => {
                self.finish(topic, envelope, channel, received_at_ms)
            }
        }
    }

    /// Decode one wire message, dropping packets already seen
    pub fn ingest(&self, topic: &str, bytes: &[u8]) -> Option<NormalizedEvent> {
        self.ingest_at(topic, bytes, Utc::now().timestamp_millis())
    }

    /// [`ingest`](Self::ingest) with an explicit receive time
    pub fn ingest_at(
        &self,
        topic: &str,
        bytes: &[u8],
        received_at_ms: i64,
    ) -> Option<NormalizedEvent> {
        let (envelope, channel) = match self.open(topic, bytes, received_at_ms) {
            Opened::Failed(event) => return Some(event),
            Opened::Envelope(envelope, channel) => (envelope, channel),
        };

        if envelope.packet.packet_id != 0 {
            if let Some(dedup) = &self.dedup {
                if dedup.is_duplicate(envelope.packet.from, envelope.packet.packet_id) {
                    Counters::bump(&self.counters.duplicates);
                    return None;
                }
            }
        }

        Some(self.finish(topic, envelope, channel, received_at_ms))
    }

    /// Parse the envelope and learn its channel mapping
    fn open(&self, topic: &str, bytes: &[u8], received_at_ms: i64) -> Opened {
        let envelope = match decode_envelope(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(topic = %topic, len = bytes.len(), error = %e, "Unreadable envelope");
                self.counters.record_failure(&e);
                let ctx =
                    PacketContext::unreadable(received_at_ms, TopicInfo::parse(topic).channel);
                return Opened::Failed(ctx.into_error(&e));
            }
        };

        let slot = envelope.packet.channel_slot;
        let channel = envelope
            .resolve_channel(topic)
            .or_else(|| self.registry.lookup_name(slot));
        if let Some(name) = &channel {
            self.registry.register(name, slot);
        }

        Opened::Envelope(envelope, channel)
    }

    /// Decrypt, decode and normalize a parsed envelope
    fn finish(
        &self,
        topic: &str,
        envelope: Envelope,
        channel: Option<String>,
        received_at_ms: i64,
    ) -> NormalizedEvent {
        let encrypted = envelope.packet.is_encrypted();
        let ctx = PacketContext::from_packet(
            &envelope.packet,
            channel.clone(),
            envelope.resolve_gateway(topic),
            encrypted,
            received_at_ms,
        );

        let packet = match decrypt_packet(envelope.packet, channel.as_deref(), &self.keys) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(
                    from = %ctx.from,
                    packet_id = ctx.packet_id,
                    channel = ?channel,
                    error = %e,
                    "Could not decrypt packet"
                );
                self.counters.record_failure(&e);
                return ctx.into_error(&e);
            }
        };
        if encrypted {
            Counters::bump(&self.counters.decrypted);
        }

        let Some(data) = packet.decoded() else {
            let e = DecodeError::EnvelopeMalformed("packet still encrypted".to_string());
            self.counters.record_failure(&e);
            return ctx.into_error(&e);
        };

        let message = match decode_inner(data) {
            Ok(message) => message,
            Err(e) => {
                // Encrypted payloads that fail the port check count as failed decryption
                let e = if encrypted {
                    DecodeError::DecryptFailed {
                        channel: channel.clone().unwrap_or_default(),
                        reason: e.to_string(),
                    }
                } else {
                    e
                };
                debug!(from = %ctx.from, port = data.port, error = %e, "Inner data rejected");
                self.counters.record_failure(&e);
                return ctx.into_error(&e);
            }
        };

        let kind = normalize_message(message, data, ctx.from);
        match &kind {
            EventKind::RawPassthrough { .. } => Counters::bump(&self.counters.raw_passthrough),
            EventKind::DecodeError { .. } => Counters::bump(&self.counters.malformed),
            _ => Counters::bump(&self.counters.decoded),
        }

        trace!(
            from = %ctx.from,
            packet_id = ctx.packet_id,
            kind = kind.label(),
            "Normalized packet"
        );
        ctx.into_event(kind)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Deduplication cache statistics, if deduplication is enabled
    pub fn dedup_stats(&self) -> Option<CacheStats> {
        self.dedup.as_ref().map(DeduplicationCache::stats)
    }

    /// Drop expired deduplication entries
    pub fn expire_dedup(&self) -> usize {
        self.dedup
            .as_ref()
            .map(DeduplicationCache::expire_old_entries)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PacketBuilder;
    use meshlens_core::DecodeFailure;

    fn pipeline() -> MeshtasticPipeline {
        MeshtasticPipeline::new(&DecoderConfig::default()).unwrap()
    }

    #[test]
    fn test_decode_plain_text() {
        let bytes = PacketBuilder::text(0x1111, "hello").channel("LongFast").build_plain();
        let event = pipeline().decode_at("msh/US/2/c/LongFast/!00001111", &bytes, 1);
        assert_eq!(
            event.kind,
            EventKind::Text {
                text: "hello".to_string()
            }
        );
        assert!(!event.encrypted);
        assert_eq!(event.gateway.as_deref(), Some("!00001111"));
    }

    #[test]
    fn test_decode_encrypted_default_channel() {
        let p = pipeline();
        let bytes = PacketBuilder::text(0x2222, "secret").channel("LongFast").build_encrypted();
        let event = p.decode_at("", &bytes, 1);
        assert!(event.encrypted);
        assert_eq!(event.payload().map(EventKind::label), Some("text"));
        assert_eq!(p.stats().decrypted, 1);
    }

    #[test]
    fn test_garbage_is_malformed_event() {
        let p = pipeline();
        let event = p.decode_at("msh/US/2/e/LongFast/!1", &[0xff; 5], 42);
        assert_eq!(event.failure(), Some(DecodeFailure::EnvelopeMalformed));
        assert_eq!(event.timestamp_ms, 42);
        assert_eq!(event.channel.as_deref(), Some("LongFast"));
        assert_eq!(p.stats().malformed, 1);
    }

    #[test]
    fn test_registry_supplies_channel_name() {
        let p = pipeline();
        let first = PacketBuilder::text(1, "a").channel("LongFast").slot(8).build_encrypted();
        p.decode_at("", &first, 0);

        // Second packet omits the channel name but uses the same slot
        let second = PacketBuilder::text(1, "b")
            .id(2)
            .channel("LongFast")
            .slot(8)
            .omit_channel_name()
            .build_encrypted();
        let event = p.decode_at("", &second, 0);
        assert_eq!(event.channel.as_deref(), Some("LongFast"));
        assert!(!event.is_error());
    }

    #[test]
    fn test_ingest_drops_duplicates() {
        let p = pipeline();
        let bytes = PacketBuilder::text(5, "dup").id(77).channel("LongFast").build_encrypted();
        assert!(p.ingest_at("", &bytes, 0).is_some());
        assert!(p.ingest_at("", &bytes, 0).is_none());
        // decode never filters
        assert!(!p.decode_at("", &bytes, 0).is_error());
        assert_eq!(p.stats().duplicates, 1);
        assert_eq!(p.dedup_stats().unwrap().duplicates_blocked, 1);
    }
}
