//! Wire-message fixtures for tests and demos
//!
//! [`PacketBuilder`] produces the exact bytes a gateway would publish, in
//! plaintext or encrypted with a channel key, so tests can drive the full
//! pipeline without captured traffic.
//!
//! # Example
//!
//! ```rust
//! use meshlens_meshtastic::fixtures::PacketBuilder;
//! use meshlens_meshtastic::{DecoderConfig, MeshtasticPipeline};
//!
//! let pipeline = MeshtasticPipeline::new(&DecoderConfig::default()).unwrap();
//! let bytes = PacketBuilder::text(0x1234, "hello").channel("LongFast").build_encrypted();
//! let event = pipeline.decode("msh/US/2/e/LongFast/!00001234", &bytes);
//! assert!(!event.is_error());
//! ```

use prost::Message;

use crate::config::{
    PORT_NEIGHBORINFO, PORT_NODEINFO, PORT_POSITION, PORT_TELEMETRY, PORT_TEXT_MESSAGE,
    PORT_TRACEROUTE,
};
use crate::crypto::encrypt_data;
use crate::keys::ChannelKey;
use crate::proto;

/// Broadcast destination
pub const BROADCAST: u32 = 0xFFFF_FFFF;

/// Builder for gateway envelopes
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    from: u32,
    to: u32,
    id: u32,
    port: i32,
    payload: Vec<u8>,
    request_id: u32,
    channel: String,
    include_channel_name: bool,
    slot: u32,
    gateway: String,
    key: Option<Vec<u8>>,
    hop_start: u32,
    hop_limit: u32,
    rx_time: u32,
    rx_snr: f32,
    rx_rssi: i32,
}

impl PacketBuilder {
    /// Packet carrying an arbitrary port payload
    pub fn new(from: u32, port: i32, payload: Vec<u8>) -> Self {
        Self {
            from,
            to: BROADCAST,
            id: rand::random::<u32>() | 1,
            port,
            payload,
            request_id: 0,
            channel: "LongFast".to_string(),
            include_channel_name: true,
            slot: 8,
            gateway: String::new(),
            key: None,
            hop_start: 0,
            hop_limit: 0,
            rx_time: 0,
            rx_snr: 0.0,
            rx_rssi: 0,
        }
    }

    /// Text message
    pub fn text(from: u32, text: &str) -> Self {
        Self::new(from, PORT_TEXT_MESSAGE, text.as_bytes().to_vec())
    }

    /// Position report in degrees
    pub fn position(from: u32, latitude: f64, longitude: f64) -> Self {
        let position = proto::Position {
            latitude_i: Some((latitude * 1e7).round() as i32),
            longitude_i: Some((longitude * 1e7).round() as i32),
            ..Default::default()
        };
        Self::new(from, PORT_POSITION, position.encode_to_vec())
    }

    /// Node identity
    pub fn node_info(from: u32, long_name: &str, short_name: &str, role: i32) -> Self {
        let user = proto::User {
            id: format!("!{from:08x}"),
            long_name: long_name.to_string(),
            short_name: short_name.to_string(),
            role,
            ..Default::default()
        };
        Self::new(from, PORT_NODEINFO, user.encode_to_vec())
    }

    /// Device telemetry
    pub fn device_metrics(from: u32, metrics: proto::DeviceMetrics) -> Self {
        let telemetry = proto::Telemetry {
            time: 0,
            variant: Some(proto::telemetry::Variant::DeviceMetrics(metrics)),
        };
        Self::new(from, PORT_TELEMETRY, telemetry.encode_to_vec())
    }

    /// Route trace reply sent by `from` back to the requester `to`
    ///
    /// SNR values are in dB and encoded as quarter-dB. The reply carries a
    /// random request id; override it with [`PacketBuilder::request_id`].
    pub fn route_reply(from: u32, to: u32, route: Vec<u32>, snr_towards: &[f32]) -> Self {
        let discovery = proto::RouteDiscovery {
            route,
            snr_towards: snr_towards.iter().map(|snr| (snr * 4.0).round() as i32).collect(),
            ..Default::default()
        };
        Self::new(from, PORT_TRACEROUTE, discovery.encode_to_vec())
            .to(to)
            .request_id(rand::random::<u32>() | 1)
    }

    /// Route trace request from `from` towards `to`, as heard after the
    /// relays in `route` appended themselves
    pub fn route_request(from: u32, to: u32, route: Vec<u32>) -> Self {
        let discovery = proto::RouteDiscovery {
            route,
            ..Default::default()
        };
        Self::new(from, PORT_TRACEROUTE, discovery.encode_to_vec()).to(to)
    }

    /// Neighbor list
    pub fn neighbor_info(from: u32, neighbors: &[(u32, f32)]) -> Self {
        let info = proto::NeighborInfo {
            node_id: from,
            neighbors: neighbors
                .iter()
                .map(|(node_id, snr)| proto::Neighbor {
                    node_id: *node_id,
                    snr: *snr,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        Self::new(from, PORT_NEIGHBORINFO, info.encode_to_vec())
    }

    /// Destination node
    pub fn to(mut self, to: u32) -> Self {
        self.to = to;
        self
    }

    /// Packet id
    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Request id carried in the data message
    pub fn request_id(mut self, request_id: u32) -> Self {
        self.request_id = request_id;
        self
    }

    /// Channel name, also used to pick the encryption key
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Leave `channel_id` empty in the envelope
    pub fn omit_channel_name(mut self) -> Self {
        self.include_channel_name = false;
        self
    }

    /// Channel slot
    pub fn slot(mut self, slot: u32) -> Self {
        self.slot = slot;
        self
    }

    /// Gateway id
    pub fn gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Raw key material to encrypt with instead of the default key
    pub fn key(mut self, key: &[u8]) -> Self {
        self.key = Some(key.to_vec());
        self
    }

    /// Hop counters
    pub fn hops(mut self, hop_start: u32, hop_limit: u32) -> Self {
        self.hop_start = hop_start;
        self.hop_limit = hop_limit;
        self
    }

    /// Receive time in seconds
    pub fn rx_time(mut self, secs: u32) -> Self {
        self.rx_time = secs;
        self
    }

    /// Receive signal quality
    pub fn signal(mut self, snr: f32, rssi: i32) -> Self {
        self.rx_snr = snr;
        self.rx_rssi = rssi;
        self
    }

    fn data(&self) -> proto::Data {
        proto::Data {
            portnum: self.port,
            payload: self.payload.clone(),
            request_id: self.request_id,
            ..Default::default()
        }
    }

    fn envelope(&self, payload: proto::mesh_packet::PayloadVariant) -> Vec<u8> {
        let packet = proto::MeshPacket {
            from: self.from,
            to: self.to,
            channel: self.slot,
            id: self.id,
            rx_time: self.rx_time,
            rx_snr: self.rx_snr,
            hop_limit: self.hop_limit,
            rx_rssi: self.rx_rssi,
            hop_start: self.hop_start,
            payload_variant: Some(payload),
            ..Default::default()
        };
        proto::ServiceEnvelope {
            packet: Some(packet),
            channel_id: if self.include_channel_name {
                self.channel.clone()
            } else {
                String::new()
            },
            gateway_id: self.gateway.clone(),
        }
        .encode_to_vec()
    }

    /// Envelope with a plaintext payload
    pub fn build_plain(&self) -> Vec<u8> {
        self.envelope(proto::mesh_packet::PayloadVariant::Decoded(self.data()))
    }

    /// Envelope with the payload encrypted under the builder's key
    ///
    /// Uses the public default key unless [`key`](Self::key) was set.
    pub fn build_encrypted(&self) -> Vec<u8> {
        let key = self
            .key
            .as_deref()
            .and_then(|raw| ChannelKey::from_bytes(raw).ok())
            .unwrap_or_else(ChannelKey::default_key);
        let ciphertext = encrypt_data(&key, self.id, self.from, &self.data());
        self.envelope(proto::mesh_packet::PayloadVariant::Encrypted(ciphertext))
    }
}
