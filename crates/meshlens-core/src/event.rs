//! Normalized event types
//!
//! Every wire message that reaches the decode pipeline comes out as exactly
//! one [`NormalizedEvent`]. Successful decodes carry a typed [`EventKind`];
//! failures carry [`EventKind::DecodeError`] so storage and live viewers can
//! show that a message was seen even when its content could not be read.
//!
//! All optional numeric fields stay `Option`: an absent battery level is not
//! a zero battery level.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::location::Location;
use crate::node::{NodeId, NodeRole};

/// Radio signal metadata attached to a received packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    /// Signal-to-noise ratio in dB
    pub snr: Option<f32>,
    /// Received signal strength in dBm
    pub rssi: Option<i32>,
    /// Hop limit the sender started with
    pub hop_start: Option<u8>,
    /// Hop limit remaining on arrival
    pub hop_limit: Option<u8>,
    /// Relays traversed, `hop_start - hop_limit`
    pub hops_away: Option<u8>,
}

impl SignalQuality {
    /// Build signal metadata, deriving `hops_away` only when both hop fields are known
    pub fn new(
        snr: Option<f32>,
        rssi: Option<i32>,
        hop_start: Option<u8>,
        hop_limit: Option<u8>,
    ) -> Self {
        let hops_away = match (hop_start, hop_limit) {
            (Some(start), Some(limit)) => start.checked_sub(limit),
            _ => None,
        };
        Self {
            snr,
            rssi,
            hop_start,
            hop_limit,
            hops_away,
        }
    }
}

/// Why a wire message could not be turned into a typed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailure {
    /// Outer envelope did not parse
    EnvelopeMalformed,
    /// No key is known for the channel; decryption was not attempted
    UnknownChannel,
    /// A key was used but the plaintext did not parse
    DecryptFailed,
    /// Port payload did not parse
    InnerDataMalformed,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeFailure::EnvelopeMalformed => "envelope_malformed",
            DecodeFailure::UnknownChannel => "unknown_channel",
            DecodeFailure::DecryptFailed => "decrypt_failed",
            DecodeFailure::InnerDataMalformed => "inner_data_malformed",
        };
        f.write_str(s)
    }
}

/// Self-reported position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Decoded coordinates (altitude in meters when reported)
    pub location: Location,
    /// Fix time reported by the node, milliseconds since epoch
    pub fix_time_ms: Option<i64>,
    /// Number of significant bits kept when the position was obfuscated
    pub precision_bits: Option<u32>,
    /// Satellites in view
    pub sats_in_view: Option<u32>,
    /// Ground speed in m/s
    pub ground_speed: Option<u32>,
    /// Ground track in 1/100 degrees
    pub ground_track: Option<u32>,
}

/// Device health metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    /// Battery level in percent (above 100 means externally powered)
    pub battery_level: Option<u32>,
    /// Battery voltage
    pub voltage: Option<f32>,
    /// Channel utilization in percent
    pub channel_utilization: Option<f32>,
    /// Transmit air-time utilization in percent
    pub air_util_tx: Option<f32>,
    /// Uptime in seconds
    pub uptime_seconds: Option<u32>,
}

/// Environment sensor metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentMetrics {
    /// Temperature in °C
    pub temperature: Option<f32>,
    /// Relative humidity in percent
    pub relative_humidity: Option<f32>,
    /// Barometric pressure in hPa
    pub barometric_pressure: Option<f32>,
}

/// Telemetry record; at most one metrics group is present per message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// Measurement time, milliseconds since epoch
    pub time_ms: Option<i64>,
    /// Device metrics
    pub device: Option<DeviceMetrics>,
    /// Environment metrics
    pub environment: Option<EnvironmentMetrics>,
}

/// Node identity announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Identity string the node claims (normally the `!xxxxxxxx` form)
    pub user_id: Option<String>,
    /// Long display name
    pub long_name: String,
    /// Short display name
    pub short_name: String,
    /// Hardware model enum value
    pub hw_model: u32,
    /// Hardware model name when known
    pub hw_model_name: Option<String>,
    /// Configured role
    pub role: NodeRole,
    /// Licensed amateur operator (unencrypted mode)
    pub is_licensed: bool,
    /// Public key when the node advertises one
    pub public_key: Option<Bytes>,
}

/// Completed or partial route trace
///
/// `route` holds the relays between requester and destination, excluding
/// both endpoints. SNR entries are in dB; `None` marks a hop whose SNR was
/// not recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteTrace {
    /// Relays on the way towards the destination
    pub route: Vec<NodeId>,
    /// Per-hop SNR towards the destination
    pub snr_towards: Vec<Option<f32>>,
    /// Relays on the way back, when the reply recorded them
    pub route_back: Option<Vec<NodeId>>,
    /// Per-hop SNR on the way back
    pub snr_back: Option<Vec<Option<f32>>>,
    /// Packet id of the original request when this is a reply
    pub request_id: Option<u32>,
}

/// One neighbor entry from a neighbor-info broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    /// Neighbor node
    pub node: NodeId,
    /// SNR at which the reporter last heard this neighbor
    pub snr: Option<f32>,
    /// When the neighbor was last heard, milliseconds since epoch
    pub last_rx_time_ms: Option<i64>,
}

/// Neighbor list broadcast by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborReport {
    /// Node that produced the list
    pub reporter: NodeId,
    /// Last node that relayed the report
    pub last_sent_by: Option<NodeId>,
    /// Broadcast interval in seconds
    pub broadcast_interval_secs: Option<u32>,
    /// Directly heard neighbors
    pub neighbors: Vec<NeighborEntry>,
}

/// Summary a node publishes about itself for map services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapReport {
    /// Long display name
    pub long_name: String,
    /// Short display name
    pub short_name: String,
    /// Configured role
    pub role: NodeRole,
    /// Hardware model enum value
    pub hw_model: u32,
    /// Firmware version string
    pub firmware_version: String,
    /// LoRa region enum value
    pub region: u32,
    /// Modem preset enum value
    pub modem_preset: u32,
    /// Whether the node still uses the default channel
    pub has_default_channel: bool,
    /// Reported position
    pub location: Option<Location>,
    /// Position precision bits
    pub position_precision: Option<u32>,
    /// Number of nodes the reporter currently sees online
    pub online_local_nodes: Option<u32>,
}

/// Typed content of a normalized event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Text message
    Text {
        /// Message body
        text: String,
    },
    /// Position update
    Position(PositionReport),
    /// Telemetry update
    Telemetry(TelemetryReport),
    /// Node identity announcement
    NodeIdentity(NodeIdentity),
    /// Route trace
    RouteTrace(RouteTrace),
    /// Neighbor list
    NeighborInfo(NeighborReport),
    /// Map report
    MapReport(MapReport),
    /// Payload on a port this build does not interpret
    RawPassthrough {
        /// Port number
        port: u32,
        /// Untouched payload bytes
        payload: Bytes,
    },
    /// Message was seen but could not be decoded
    DecodeError {
        /// Failure class
        reason: DecodeFailure,
        /// Human-readable detail
        detail: String,
    },
}

impl EventKind {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Text { .. } => "text",
            EventKind::Position(_) => "position",
            EventKind::Telemetry(_) => "telemetry",
            EventKind::NodeIdentity(_) => "node_identity",
            EventKind::RouteTrace(_) => "route_trace",
            EventKind::NeighborInfo(_) => "neighbor_info",
            EventKind::MapReport(_) => "map_report",
            EventKind::RawPassthrough { .. } => "raw",
            EventKind::DecodeError { .. } => "decode_error",
        }
    }
}

/// A decoded (or failed) wire message in its stable domain form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Packet identifier assigned by the sender
    pub packet_id: u32,
    /// Sending node
    pub from: NodeId,
    /// Destination node, `None` for broadcasts
    pub to: Option<NodeId>,
    /// Channel name the message arrived on
    pub channel: Option<String>,
    /// Channel slot (hash) carried in the packet
    pub channel_slot: u8,
    /// Gateway that uplinked the packet
    pub gateway: Option<String>,
    /// Receive time in milliseconds since epoch
    pub timestamp_ms: i64,
    /// Signal metadata
    pub signal: SignalQuality,
    /// Packet was relayed through a broker rather than heard over the air
    pub via_mqtt: bool,
    /// Packet arrived encrypted
    pub encrypted: bool,
    /// Typed content
    pub kind: EventKind,
}

impl NormalizedEvent {
    /// Canonical sender identity string
    pub fn node_id(&self) -> String {
        self.from.to_string()
    }

    /// Check if this event records a decode failure
    pub fn is_error(&self) -> bool {
        matches!(self.kind, EventKind::DecodeError { .. })
    }

    /// Failure class, if any
    pub fn failure(&self) -> Option<DecodeFailure> {
        match &self.kind {
            EventKind::DecodeError { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Decoded content, `None` when the message could not be decoded
    pub fn payload(&self) -> Option<&EventKind> {
        if self.is_error() {
            None
        } else {
            Some(&self.kind)
        }
    }

    /// Relays traversed, when known
    pub fn hops_away(&self) -> Option<u8> {
        self.signal.hops_away
    }

    /// Receive time as a UTC timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: EventKind) -> NormalizedEvent {
        NormalizedEvent {
            packet_id: 7,
            from: NodeId(0xabc),
            to: None,
            channel: Some("LongFast".to_string()),
            channel_slot: 8,
            gateway: None,
            timestamp_ms: 1_700_000_000_000,
            signal: SignalQuality::new(Some(5.5), Some(-90), Some(3), Some(1)),
            via_mqtt: false,
            encrypted: true,
            kind,
        }
    }

    #[test]
    fn test_hops_away_requires_both_fields() {
        assert_eq!(SignalQuality::new(None, None, Some(3), Some(1)).hops_away, Some(2));
        assert_eq!(SignalQuality::new(None, None, None, Some(1)).hops_away, None);
        assert_eq!(SignalQuality::new(None, None, Some(3), None).hops_away, None);
        // Inconsistent hop data is unknown, not zero
        assert_eq!(SignalQuality::new(None, None, Some(1), Some(3)).hops_away, None);
    }

    #[test]
    fn test_error_event_has_no_payload() {
        let event = sample(EventKind::DecodeError {
            reason: DecodeFailure::UnknownChannel,
            detail: "no key".to_string(),
        });
        assert!(event.is_error());
        assert!(event.payload().is_none());
        assert_eq!(event.failure(), Some(DecodeFailure::UnknownChannel));
    }

    #[test]
    fn test_serialized_shape() {
        let event = sample(EventKind::Text {
            text: "hi".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "!00000abc");
        assert_eq!(json["kind"]["type"], "text");
        assert_eq!(json["signal"]["hops_away"], 2);
        assert_eq!(event.node_id(), "!00000abc");
        assert_eq!(event.timestamp().timestamp(), 1_700_000_000);
    }
}
