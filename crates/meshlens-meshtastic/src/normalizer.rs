//! Message normalization
//!
//! Turns an inner message plus its packet metadata into a
//! [`NormalizedEvent`]. Units are unified here: every timestamp becomes
//! milliseconds since epoch, route-trace SNR goes from quarter-dB integers
//! to dB, and node ids are rendered through [`NodeId`] so a sender string
//! from a payload and one derived from the packet number always agree.

use bytes::Bytes;
use meshlens_core::{
    DecodeFailure, DeviceMetrics, EnvironmentMetrics, EventKind, Location, MapReport,
    NeighborEntry, NeighborReport, NodeId, NodeIdentity, NodeRole, NormalizedEvent,
    PositionReport, RouteTrace, SignalQuality, TelemetryReport,
};
use tracing::debug;

use crate::config::SNR_UNKNOWN_QUARTER_DB;
use crate::decoder::{hw_model_name, InnerMessage};
use crate::envelope::{DecodedData, InnerPacket};
use crate::error::DecodeError;
use crate::proto;

/// Envelope metadata shared by every event from one packet
#[derive(Debug, Clone, PartialEq)]
pub struct PacketContext {
    pub packet_id: u32,
    pub from: NodeId,
    pub to: Option<NodeId>,
    pub channel: Option<String>,
    pub channel_slot: u8,
    pub gateway: Option<String>,
    pub timestamp_ms: i64,
    pub signal: SignalQuality,
    pub via_mqtt: bool,
    pub encrypted: bool,
}

impl PacketContext {
    /// Capture packet metadata
    ///
    /// `received_at_ms` is used when the packet carries no receive time.
    /// `encrypted` records whether the packet arrived as ciphertext, since
    /// the packet passed here may already be decrypted.
    pub fn from_packet(
        packet: &InnerPacket,
        channel: Option<String>,
        gateway: Option<String>,
        encrypted: bool,
        received_at_ms: i64,
    ) -> Self {
        let to = NodeId::from(packet.to);
        Self {
            packet_id: packet.packet_id,
            from: NodeId::from(packet.from),
            to: if to.is_broadcast() { None } else { Some(to) },
            channel,
            channel_slot: packet.channel_slot,
            gateway: gateway.map(|g| NodeId::normalize(&g).unwrap_or(g)),
            timestamp_ms: packet
                .rx_time
                .map(secs_to_ms)
                .unwrap_or(received_at_ms),
            signal: SignalQuality::new(
                packet.rx_snr,
                packet.rx_rssi,
                packet.hop_start,
                packet.hop_limit,
            ),
            via_mqtt: packet.via_mqtt,
            encrypted,
        }
    }

    /// Context for a buffer whose envelope could not be read
    pub fn unreadable(received_at_ms: i64, channel: Option<String>) -> Self {
        Self {
            packet_id: 0,
            from: NodeId::UNKNOWN,
            to: None,
            channel,
            channel_slot: 0,
            gateway: None,
            timestamp_ms: received_at_ms,
            signal: SignalQuality::default(),
            via_mqtt: false,
            encrypted: false,
        }
    }

    /// Attach an event kind
    pub fn into_event(self, kind: EventKind) -> NormalizedEvent {
        NormalizedEvent {
            packet_id: self.packet_id,
            from: self.from,
            to: self.to,
            channel: self.channel,
            channel_slot: self.channel_slot,
            gateway: self.gateway,
            timestamp_ms: self.timestamp_ms,
            signal: self.signal,
            via_mqtt: self.via_mqtt,
            encrypted: self.encrypted,
            kind,
        }
    }

    /// Record a decode failure; the event carries no payload
    pub fn into_error(self, error: &DecodeError) -> NormalizedEvent {
        self.into_event(error_kind(error))
    }
}

/// Event kind for a decode failure
pub fn error_kind(error: &DecodeError) -> EventKind {
    EventKind::DecodeError {
        reason: error.kind(),
        detail: error.to_string(),
    }
}

/// Map an inner message into an event kind
pub fn normalize_message(message: InnerMessage, data: &DecodedData, from: NodeId) -> EventKind {
    match message {
        InnerMessage::Text(text) => EventKind::Text { text },
        InnerMessage::Position(position) => match position_report(&position) {
            Some(report) => EventKind::Position(report),
            None => EventKind::DecodeError {
                reason: DecodeFailure::InnerDataMalformed,
                detail: "position has no coordinates".to_string(),
            },
        },
        InnerMessage::NodeInfo(user) => EventKind::NodeIdentity(node_identity(user, from)),
        InnerMessage::Telemetry(telemetry) => EventKind::Telemetry(telemetry_report(telemetry)),
        InnerMessage::RouteTrace(route) => {
            EventKind::RouteTrace(route_trace(route, data.request_id))
        }
        InnerMessage::NeighborInfo(info) => EventKind::NeighborInfo(neighbor_report(info, from)),
        InnerMessage::MapReport(report) => EventKind::MapReport(map_report(report)),
        InnerMessage::Raw { port, payload } => EventKind::RawPassthrough {
            port: port as u32,
            payload,
        },
    }
}

fn secs_to_ms(secs: u32) -> i64 {
    i64::from(secs) * 1000
}

fn non_zero_ms(secs: u32) -> Option<i64> {
    if secs == 0 {
        None
    } else {
        Some(secs_to_ms(secs))
    }
}

fn non_zero_u32(value: u32) -> Option<u32> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

/// Quarter-dB to dB, with the unknown sentinel mapped to `None`
pub fn quarter_db(value: i32) -> Option<f32> {
    if value == SNR_UNKNOWN_QUARTER_DB {
        None
    } else {
        Some(value as f32 / 4.0)
    }
}

fn position_report(position: &proto::Position) -> Option<PositionReport> {
    let mut location = Location::from_fixed_point(position.latitude_i, position.longitude_i)?;
    location.altitude = position.altitude.map(f64::from);

    Some(PositionReport {
        location,
        fix_time_ms: non_zero_ms(position.time),
        precision_bits: non_zero_u32(position.precision_bits),
        sats_in_view: non_zero_u32(position.sats_in_view),
        ground_speed: position.ground_speed,
        ground_track: position.ground_track,
    })
}

fn node_identity(user: proto::User, from: NodeId) -> NodeIdentity {
    let derived = from.to_string();
    let user_id = if user.id.is_empty() {
        derived
    } else {
        match NodeId::normalize(&user.id) {
            Some(normalized) => {
                if normalized != derived {
                    debug!(
                        claimed = %normalized,
                        sender = %derived,
                        "Node identity id differs from packet sender"
                    );
                }
                normalized
            }
            None => user.id,
        }
    };

    NodeIdentity {
        user_id: Some(user_id),
        long_name: user.long_name,
        short_name: user.short_name,
        hw_model: user.hw_model.max(0) as u32,
        hw_model_name: hw_model_name(user.hw_model).map(str::to_string),
        role: NodeRole::from_i32(user.role),
        is_licensed: user.is_licensed,
        public_key: if user.public_key.is_empty() {
            None
        } else {
            Some(Bytes::from(user.public_key))
        },
    }
}

fn telemetry_report(telemetry: proto::Telemetry) -> TelemetryReport {
    let mut report = TelemetryReport {
        time_ms: non_zero_ms(telemetry.time),
        ..Default::default()
    };
    match telemetry.variant {
        Some(proto::telemetry::Variant::DeviceMetrics(m)) => {
            report.device = Some(DeviceMetrics {
                battery_level: m.battery_level,
                voltage: m.voltage,
                channel_utilization: m.channel_utilization,
                air_util_tx: m.air_util_tx,
                uptime_seconds: m.uptime_seconds,
            });
        }
        Some(proto::telemetry::Variant::EnvironmentMetrics(m)) => {
            report.environment = Some(EnvironmentMetrics {
                temperature: m.temperature,
                relative_humidity: m.relative_humidity,
                barometric_pressure: m.barometric_pressure,
            });
        }
        None => {}
    }
    report
}

fn route_trace(route: proto::RouteDiscovery, request_id: Option<u32>) -> RouteTrace {
    let has_return = !route.route_back.is_empty() || !route.snr_back.is_empty();
    RouteTrace {
        route: route.route.into_iter().map(NodeId::from).collect(),
        snr_towards: route.snr_towards.into_iter().map(quarter_db).collect(),
        route_back: has_return
            .then(|| route.route_back.into_iter().map(NodeId::from).collect()),
        snr_back: has_return.then(|| route.snr_back.into_iter().map(quarter_db).collect()),
        request_id,
    }
}

fn neighbor_report(info: proto::NeighborInfo, from: NodeId) -> NeighborReport {
    let reporter = if info.node_id == 0 {
        from
    } else {
        NodeId::from(info.node_id)
    };
    NeighborReport {
        reporter,
        last_sent_by: non_zero_u32(info.last_sent_by_id).map(NodeId::from),
        broadcast_interval_secs: non_zero_u32(info.node_broadcast_interval_secs),
        neighbors: info
            .neighbors
            .into_iter()
            .filter(|n| n.node_id != 0)
            .map(|n| NeighborEntry {
                node: NodeId::from(n.node_id),
                snr: if n.snr == 0.0 { None } else { Some(n.snr) },
                last_rx_time_ms: non_zero_ms(n.last_rx_time),
            })
            .collect(),
    }
}

fn map_report(report: proto::MapReport) -> MapReport {
    let mut location =
        Location::from_fixed_point(Some(report.latitude_i), Some(report.longitude_i));
    if let Some(loc) = location.as_mut() {
        if report.altitude != 0 {
            loc.altitude = Some(f64::from(report.altitude));
        }
    }

    MapReport {
        long_name: report.long_name,
        short_name: report.short_name,
        role: NodeRole::from_i32(report.role),
        hw_model: report.hw_model.max(0) as u32,
        firmware_version: report.firmware_version,
        region: report.region.max(0) as u32,
        modem_preset: report.modem_preset.max(0) as u32,
        has_default_channel: report.has_default_channel,
        location,
        position_precision: non_zero_u32(report.position_precision),
        online_local_nodes: non_zero_u32(report.num_online_local_nodes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PacketPayload;

    fn packet() -> InnerPacket {
        InnerPacket {
            from: 0xDEAD_BEEF,
            to: u32::MAX,
            packet_id: 99,
            channel_slot: 8,
            hop_start: Some(3),
            hop_limit: Some(2),
            rx_time: Some(1_700_000_000),
            rx_snr: Some(6.25),
            rx_rssi: Some(-80),
            want_ack: false,
            via_mqtt: false,
            payload: PacketPayload::Encrypted(Bytes::new()),
        }
    }

    fn data(request_id: Option<u32>) -> DecodedData {
        DecodedData {
            port: 70,
            payload: Bytes::new(),
            want_response: false,
            request_id,
            reply_id: None,
        }
    }

    #[test]
    fn test_context_metadata() {
        let ctx = PacketContext::from_packet(
            &packet(),
            Some("LongFast".into()),
            Some("0x00000001".into()),
            true,
            5,
        );
        assert_eq!(ctx.from.to_string(), "!deadbeef");
        assert!(ctx.to.is_none());
        assert_eq!(ctx.timestamp_ms, 1_700_000_000_000);
        assert_eq!(ctx.signal.hops_away, Some(1));
        assert_eq!(ctx.gateway.as_deref(), Some("!00000001"));
    }

    #[test]
    fn test_receive_clock_fallback() {
        let mut p = packet();
        p.rx_time = None;
        p.hop_start = None;
        let ctx = PacketContext::from_packet(&p, None, None, false, 1234);
        assert_eq!(ctx.timestamp_ms, 1234);
        assert_eq!(ctx.signal.hops_away, None);
    }

    #[test]
    fn test_route_trace_snr_units() {
        let route = proto::RouteDiscovery {
            route: vec![0x10, 0x20],
            snr_towards: vec![24, -128, -30],
            ..Default::default()
        };
        let kind = normalize_message(InnerMessage::RouteTrace(route), &data(Some(7)), NodeId(1));
        let EventKind::RouteTrace(trace) = kind else {
            panic!("expected route trace");
        };
        assert_eq!(trace.route, vec![NodeId(0x10), NodeId(0x20)]);
        assert_eq!(trace.snr_towards, vec![Some(6.0), None, Some(-7.5)]);
        assert!(trace.route_back.is_none());
        assert_eq!(trace.request_id, Some(7));
    }

    #[test]
    fn test_route_back_presence() {
        let route = proto::RouteDiscovery {
            snr_back: vec![8],
            ..Default::default()
        };
        let kind = normalize_message(InnerMessage::RouteTrace(route), &data(None), NodeId(1));
        let EventKind::RouteTrace(trace) = kind else {
            panic!("expected route trace");
        };
        assert_eq!(trace.route_back, Some(Vec::new()));
        assert_eq!(trace.snr_back, Some(vec![Some(2.0)]));
    }

    #[test]
    fn test_node_identity_id_agrees_with_sender() {
        let user = proto::User {
            id: "!DEADBEEF".to_string(),
            long_name: "Base Camp".to_string(),
            short_name: "BC".to_string(),
            hw_model: 9,
            role: 2,
            ..Default::default()
        };
        let kind = normalize_message(InnerMessage::NodeInfo(user), &data(None), NodeId(0xDEAD_BEEF));
        let EventKind::NodeIdentity(identity) = kind else {
            panic!("expected identity");
        };
        assert_eq!(identity.user_id.as_deref(), Some("!deadbeef"));
        assert_eq!(identity.hw_model_name.as_deref(), Some("RAK4631"));
        assert_eq!(identity.role, NodeRole::Router);
        assert!(identity.public_key.is_none());

        let anonymous = proto::User::default();
        let kind = normalize_message(InnerMessage::NodeInfo(anonymous), &data(None), NodeId(0xab));
        let EventKind::NodeIdentity(identity) = kind else {
            panic!("expected identity");
        };
        assert_eq!(identity.user_id.as_deref(), Some("!000000ab"));
    }

    #[test]
    fn test_telemetry_keeps_absent_fields() {
        let telemetry = proto::Telemetry {
            time: 0,
            variant: Some(proto::telemetry::Variant::DeviceMetrics(proto::DeviceMetrics {
                voltage: Some(3.9),
                ..Default::default()
            })),
        };
        let kind = normalize_message(InnerMessage::Telemetry(telemetry), &data(None), NodeId(1));
        let EventKind::Telemetry(report) = kind else {
            panic!("expected telemetry");
        };
        let device = report.device.unwrap();
        assert_eq!(device.voltage, Some(3.9));
        assert_eq!(device.battery_level, None);
        assert!(report.time_ms.is_none());
        assert!(report.environment.is_none());
    }

    #[test]
    fn test_neighbor_report() {
        let info = proto::NeighborInfo {
            node_id: 0,
            neighbors: vec![
                proto::Neighbor {
                    node_id: 0x22,
                    snr: 4.5,
                    last_rx_time: 10,
                    ..Default::default()
                },
                proto::Neighbor::default(),
            ],
            ..Default::default()
        };
        let kind = normalize_message(InnerMessage::NeighborInfo(info), &data(None), NodeId(0x11));
        let EventKind::NeighborInfo(report) = kind else {
            panic!("expected neighbor info");
        };
        assert_eq!(report.reporter, NodeId(0x11));
        assert_eq!(report.neighbors.len(), 1);
        assert_eq!(report.neighbors[0].snr, Some(4.5));
        assert_eq!(report.neighbors[0].last_rx_time_ms, Some(10_000));
    }

    #[test]
    fn test_error_event_has_envelope_fields() {
        let ctx = PacketContext::from_packet(&packet(), Some("Secret".into()), None, true, 0);
        let event = ctx.into_error(&DecodeError::UnknownChannel("Secret".into()));
        assert_eq!(event.failure(), Some(DecodeFailure::UnknownChannel));
        assert!(event.payload().is_none());
        assert!(event.encrypted);
        assert_eq!(event.packet_id, 99);
        assert_eq!(event.channel.as_deref(), Some("Secret"));
    }
}
