//! Meshtastic decode pipeline for mesh telemetry analysis
//!
//! This crate turns the binary envelopes Meshtastic gateways publish into
//! [`NormalizedEvent`](meshlens_core::NormalizedEvent)s: envelope parsing,
//! per-channel AES-CTR decryption, port dispatch and normalization, plus a
//! learned channel name/slot registry and duplicate suppression.
//!
//! # Architecture
//!
//! 1. **Envelope** - [`envelope::decode_envelope`] parses the outer wrapper
//! 2. **Crypto** - [`crypto::decrypt_packet`] with keys from [`ChannelKeyStore`]
//! 3. **Decoder** - [`decoder::decode_inner`] dispatches on [`PortNum`]
//! 4. **Normalizer** - [`normalizer::normalize_message`] builds the event
//!
//! [`MeshtasticPipeline`] runs all four and never fails: every problem is
//! reported as a `DecodeError` event.
//!
//! # Quick Start
//!
//! ```rust
//! use meshlens_meshtastic::{DecoderConfigBuilder, MeshtasticPipeline};
//! use meshlens_meshtastic::fixtures::PacketBuilder;
//!
//! let config = DecoderConfigBuilder::new()
//!     .channel_key("Ops", "AQIDBAUGBwgJCgsMDQ4PEA==")
//!     .build();
//! let pipeline = MeshtasticPipeline::new(&config).unwrap();
//!
//! let bytes = PacketBuilder::text(0xdeadbeef, "hello")
//!     .channel("LongFast")
//!     .build_encrypted();
//! let event = pipeline.decode("msh/US/2/e/LongFast/!deadbeef", &bytes);
//! assert_eq!(event.from.to_string(), "!deadbeef");
//! ```

pub mod cache;
pub mod config;
pub mod crypto;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod fixtures;
pub mod keys;
pub mod normalizer;
pub mod pipeline;
pub mod proto;
pub mod registry;

pub use cache::{CacheStats, DeduplicationCache, PacketKey};
pub use config::{
    DecoderConfig, DecoderConfigBuilder, DEFAULT_CHANNEL_KEY_B64, DEFAULT_CHANNEL_NAMES,
};
pub use crypto::{decrypt_packet, encrypt_data};
pub use decoder::{decode_inner, InnerMessage, PortNum};
pub use envelope::{decode_envelope, DecodedData, Envelope, InnerPacket, PacketPayload, TopicInfo};
pub use error::{DecodeError, Result};
pub use keys::{ChannelKey, ChannelKeyStore};
pub use normalizer::{normalize_message, PacketContext};
pub use pipeline::{MeshtasticPipeline, PipelineStats};
pub use registry::{ChannelRegistry, PersistCallback};
