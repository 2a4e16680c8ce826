//! Meshtastic protobuf messages
//!
//! Only the messages and fields the decode pipeline reads are declared here,
//! using `prost` derives instead of generated code. Fields this build does
//! not know are skipped by prost, so newer firmware stays decodable.
//!
//! Field numbers follow `mesh.proto`, `mqtt.proto`, `telemetry.proto` and
//! `portnums.proto` from the Meshtastic protobuf definitions.

/// Outer wrapper published by gateways
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceEnvelope {
    /// The radio packet
    #[prost(message, optional, tag = "1")]
    pub packet: Option<MeshPacket>,
    /// Channel name the gateway uplinked on
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Gateway node id (`!xxxxxxxx`)
    #[prost(string, tag = "3")]
    pub gateway_id: String,
}

/// A packet as it travels over the mesh
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshPacket {
    /// Sender node number
    #[prost(fixed32, tag = "1")]
    pub from: u32,
    /// Destination node number
    #[prost(fixed32, tag = "2")]
    pub to: u32,
    /// Channel hash/slot
    #[prost(uint32, tag = "3")]
    pub channel: u32,
    /// Packet identifier
    #[prost(fixed32, tag = "6")]
    pub id: u32,
    /// Receive time in seconds since epoch
    #[prost(fixed32, tag = "7")]
    pub rx_time: u32,
    /// Receive SNR
    #[prost(float, tag = "8")]
    pub rx_snr: f32,
    /// Remaining hop limit
    #[prost(uint32, tag = "9")]
    pub hop_limit: u32,
    /// Sender asked for an ack
    #[prost(bool, tag = "10")]
    pub want_ack: bool,
    /// Receive RSSI
    #[prost(int32, tag = "12")]
    pub rx_rssi: i32,
    /// Packet came through a broker
    #[prost(bool, tag = "14")]
    pub via_mqtt: bool,
    /// Hop limit the sender started with
    #[prost(uint32, tag = "15")]
    pub hop_start: u32,
    /// Decoded or encrypted payload
    #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
    pub payload_variant: Option<mesh_packet::PayloadVariant>,
}

/// Nested types for [`MeshPacket`]
pub mod mesh_packet {
    /// Payload arm of a mesh packet
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Plaintext payload
        #[prost(message, tag = "4")]
        Decoded(super::Data),
        /// Encrypted payload bytes
        #[prost(bytes, tag = "5")]
        Encrypted(Vec<u8>),
    }
}

/// Port-tagged payload
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    /// Port number
    #[prost(int32, tag = "1")]
    pub portnum: i32,
    /// Port payload bytes
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    /// Sender wants a reply
    #[prost(bool, tag = "3")]
    pub want_response: bool,
    /// Final destination for relayed requests
    #[prost(fixed32, tag = "4")]
    pub dest: u32,
    /// Original source for relayed requests
    #[prost(fixed32, tag = "5")]
    pub source: u32,
    /// Id of the request this replies to
    #[prost(fixed32, tag = "6")]
    pub request_id: u32,
    /// Id of the message this replies to
    #[prost(fixed32, tag = "7")]
    pub reply_id: u32,
    /// Emoji reaction flag
    #[prost(fixed32, tag = "8")]
    pub emoji: u32,
}

/// Position report
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Position {
    #[prost(sfixed32, optional, tag = "1")]
    pub latitude_i: Option<i32>,
    #[prost(sfixed32, optional, tag = "2")]
    pub longitude_i: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub altitude: Option<i32>,
    #[prost(fixed32, tag = "4")]
    pub time: u32,
    #[prost(uint32, optional, tag = "15")]
    pub ground_speed: Option<u32>,
    #[prost(uint32, optional, tag = "16")]
    pub ground_track: Option<u32>,
    #[prost(uint32, tag = "19")]
    pub sats_in_view: u32,
    #[prost(uint32, tag = "23")]
    pub precision_bits: u32,
}

/// Node identity
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub long_name: String,
    #[prost(string, tag = "3")]
    pub short_name: String,
    #[prost(bytes = "vec", tag = "4")]
    pub macaddr: Vec<u8>,
    #[prost(int32, tag = "5")]
    pub hw_model: i32,
    #[prost(bool, tag = "6")]
    pub is_licensed: bool,
    #[prost(int32, tag = "7")]
    pub role: i32,
    #[prost(bytes = "vec", tag = "8")]
    pub public_key: Vec<u8>,
}

/// Route trace request/response
///
/// SNR values are signed quarter-dB; `-128` means unknown.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RouteDiscovery {
    #[prost(fixed32, repeated, tag = "1")]
    pub route: Vec<u32>,
    #[prost(int32, repeated, tag = "2")]
    pub snr_towards: Vec<i32>,
    #[prost(fixed32, repeated, tag = "3")]
    pub route_back: Vec<u32>,
    #[prost(int32, repeated, tag = "4")]
    pub snr_back: Vec<i32>,
}

/// Neighbor list
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NeighborInfo {
    #[prost(uint32, tag = "1")]
    pub node_id: u32,
    #[prost(uint32, tag = "2")]
    pub last_sent_by_id: u32,
    #[prost(uint32, tag = "3")]
    pub node_broadcast_interval_secs: u32,
    #[prost(message, repeated, tag = "4")]
    pub neighbors: Vec<Neighbor>,
}

/// One neighbor in a [`NeighborInfo`]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Neighbor {
    #[prost(uint32, tag = "1")]
    pub node_id: u32,
    #[prost(float, tag = "2")]
    pub snr: f32,
    #[prost(fixed32, tag = "3")]
    pub last_rx_time: u32,
    #[prost(uint32, tag = "4")]
    pub node_broadcast_interval_secs: u32,
}

/// Telemetry wrapper
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Telemetry {
    #[prost(fixed32, tag = "1")]
    pub time: u32,
    #[prost(oneof = "telemetry::Variant", tags = "2, 3")]
    pub variant: Option<telemetry::Variant>,
}

/// Nested types for [`Telemetry`]
pub mod telemetry {
    /// Metrics group carried by a telemetry message
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Variant {
        /// Device health
        #[prost(message, tag = "2")]
        DeviceMetrics(super::DeviceMetrics),
        /// Environment sensors
        #[prost(message, tag = "3")]
        EnvironmentMetrics(super::EnvironmentMetrics),
    }
}

/// Device health metrics
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceMetrics {
    #[prost(uint32, optional, tag = "1")]
    pub battery_level: Option<u32>,
    #[prost(float, optional, tag = "2")]
    pub voltage: Option<f32>,
    #[prost(float, optional, tag = "3")]
    pub channel_utilization: Option<f32>,
    #[prost(float, optional, tag = "4")]
    pub air_util_tx: Option<f32>,
    #[prost(uint32, optional, tag = "5")]
    pub uptime_seconds: Option<u32>,
}

/// Environment sensor metrics
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvironmentMetrics {
    #[prost(float, optional, tag = "1")]
    pub temperature: Option<f32>,
    #[prost(float, optional, tag = "2")]
    pub relative_humidity: Option<f32>,
    #[prost(float, optional, tag = "3")]
    pub barometric_pressure: Option<f32>,
}

/// Map report published by nodes with map reporting enabled
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapReport {
    #[prost(string, tag = "1")]
    pub long_name: String,
    #[prost(string, tag = "2")]
    pub short_name: String,
    #[prost(int32, tag = "3")]
    pub role: i32,
    #[prost(int32, tag = "4")]
    pub hw_model: i32,
    #[prost(string, tag = "5")]
    pub firmware_version: String,
    #[prost(int32, tag = "6")]
    pub region: i32,
    #[prost(int32, tag = "7")]
    pub modem_preset: i32,
    #[prost(bool, tag = "8")]
    pub has_default_channel: bool,
    #[prost(sfixed32, tag = "9")]
    pub latitude_i: i32,
    #[prost(sfixed32, tag = "10")]
    pub longitude_i: i32,
    #[prost(int32, tag = "11")]
    pub altitude: i32,
    #[prost(uint32, tag = "12")]
    pub position_precision: u32,
    #[prost(uint32, tag = "13")]
    pub num_online_local_nodes: u32,
}
