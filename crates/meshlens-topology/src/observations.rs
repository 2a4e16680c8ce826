//! Analysis inputs
//!
//! The analysis engine works on snapshots: a roster of known nodes and
//! bounded slices of route traces, messages and neighbor reports. Storage
//! usually supplies these directly; [`Observations::from_events`] derives
//! them from a batch of normalized events instead.

use meshlens_core::{EventKind, Location, NodeId, NodeRole, NormalizedEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A node as known to the storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub position: Option<Location>,
    pub role: Option<NodeRole>,
    /// Most recent receive SNR in dB
    pub snr: Option<f32>,
    pub last_heard_ms: Option<i64>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
}

impl NodeRecord {
    /// Bare record for a node id
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            position: None,
            role: None,
            snr: None,
            last_heard_ms: None,
            long_name: None,
            short_name: None,
        }
    }

    /// Attach a position
    pub fn with_position(mut self, location: Location) -> Self {
        self.position = Some(location);
        self
    }

    /// Attach a role
    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Attach an SNR reading
    pub fn with_snr(mut self, snr: f32) -> Self {
        self.snr = Some(snr);
        self
    }
}

/// Known nodes keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRoster {
    nodes: BTreeMap<NodeId, NodeRecord>,
}

impl NodeRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node
    pub fn insert(&mut self, record: NodeRecord) {
        self.nodes.insert(record.id, record);
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Nodes with a known position
    pub fn positioned(&self) -> impl Iterator<Item = (&NodeRecord, &Location)> {
        self.nodes
            .values()
            .filter_map(|n| n.position.as_ref().map(|loc| (n, loc)))
    }

    pub fn position_of(&self, id: &NodeId) -> Option<&Location> {
        self.nodes.get(id).and_then(|n| n.position.as_ref())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Derive a roster from events
    ///
    /// Keeps the latest position, identity and signal per node. Events are
    /// applied in timestamp order, so input order does not matter.
    pub fn from_events(events: &[NormalizedEvent]) -> Self {
        let mut ordered: Vec<&NormalizedEvent> = events
            .iter()
            .filter(|e| e.from != NodeId::UNKNOWN && !e.from.is_broadcast())
            .collect();
        ordered.sort_by_key(|e| e.timestamp_ms);

        let mut roster = Self::new();
        for event in ordered {
            let record = roster
                .nodes
                .entry(event.from)
                .or_insert_with(|| NodeRecord::new(event.from));
            record.last_heard_ms = Some(event.timestamp_ms);
            if let Some(snr) = event.signal.snr {
                record.snr = Some(snr);
            }

            match &event.kind {
                EventKind::Position(report) => record.position = Some(report.location),
                EventKind::NodeIdentity(identity) => {
                    record.role = Some(identity.role);
                    record.long_name = Some(identity.long_name.clone());
                    record.short_name = Some(identity.short_name.clone());
                }
                EventKind::MapReport(report) => {
                    record.role = Some(report.role);
                    record.long_name = Some(report.long_name.clone());
                    record.short_name = Some(report.short_name.clone());
                    if record.position.is_none() {
                        record.position = report.location;
                    }
                }
                _ => {}
            }
        }
        roster
    }
}

impl FromIterator<NodeRecord> for NodeRoster {
    fn from_iter<T: IntoIterator<Item = NodeRecord>>(iter: T) -> Self {
        let mut roster = Self::new();
        for record in iter {
            roster.insert(record);
        }
        roster
    }
}

/// A completed route trace from `from` to `to`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTraceRecord {
    /// Node that requested the trace
    pub from: NodeId,
    /// Traced destination
    pub to: NodeId,
    /// Intermediate hops, outbound
    pub route: Vec<NodeId>,
    /// SNR per outbound link in dB
    pub snr_towards: Vec<Option<f32>>,
    /// Intermediate hops on the way back
    pub route_back: Option<Vec<NodeId>>,
    pub snr_back: Option<Vec<Option<f32>>>,
    pub timestamp_ms: i64,
}

impl RouteTraceRecord {
    /// Trace through the given intermediate hops, no SNR or return path
    pub fn new(from: NodeId, to: NodeId, route: Vec<NodeId>, timestamp_ms: i64) -> Self {
        Self {
            from,
            to,
            route,
            snr_towards: Vec::new(),
            route_back: None,
            snr_back: None,
            timestamp_ms,
        }
    }

    /// Read a trace from a route-trace event
    ///
    /// The responder's event carries the finished trace, so the event's
    /// sender is the traced destination and its recipient the requester.
    /// Only replies carry a request id; a request overheard in flight holds
    /// a partial route toward a node it may never reach, so it is skipped.
    /// Events without a unicast recipient are not completed traces.
    pub fn from_event(event: &NormalizedEvent) -> Option<Self> {
        let EventKind::RouteTrace(trace) = &event.kind else {
            return None;
        };
        trace.request_id?;
        let requester = event.to?;
        Some(Self {
            from: requester,
            to: event.from,
            route: trace.route.clone(),
            snr_towards: trace.snr_towards.clone(),
            route_back: trace.route_back.clone(),
            snr_back: trace.snr_back.clone(),
            timestamp_ms: event.timestamp_ms,
        })
    }

    /// Full outbound hop list: requester, route, destination
    pub fn outbound_hops(&self) -> Vec<NodeId> {
        let mut hops = Vec::with_capacity(self.route.len() + 2);
        hops.push(self.from);
        hops.extend(self.route.iter().copied());
        hops.push(self.to);
        hops
    }

    /// Full return hop list: destination, route back, requester
    pub fn return_hops(&self) -> Option<Vec<NodeId>> {
        self.route_back.as_ref().map(|back| {
            let mut hops = Vec::with_capacity(back.len() + 2);
            hops.push(self.to);
            hops.extend(back.iter().copied());
            hops.push(self.from);
            hops
        })
    }

    /// Consecutive outbound hop pairs with their SNR
    pub fn outbound_links(&self) -> Vec<(NodeId, NodeId, Option<f32>)> {
        pair_up(&self.outbound_hops(), &self.snr_towards)
    }

    /// Consecutive return hop pairs with their SNR
    pub fn return_links(&self) -> Vec<(NodeId, NodeId, Option<f32>)> {
        match self.return_hops() {
            Some(hops) => pair_up(&hops, self.snr_back.as_deref().unwrap_or(&[])),
            None => Vec::new(),
        }
    }
}

fn pair_up(hops: &[NodeId], snr: &[Option<f32>]) -> Vec<(NodeId, NodeId, Option<f32>)> {
    hops.windows(2)
        .enumerate()
        .map(|(i, pair)| (pair[0], pair[1], snr.get(i).copied().flatten()))
        .collect()
}

/// A message as evidence of who heard whom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub from: NodeId,
    /// Recipient, or the gateway that heard a broadcast
    pub to: Option<NodeId>,
    pub hops_away: Option<u8>,
    pub snr: Option<f32>,
    pub rssi: Option<i32>,
    /// Relayed through the broker rather than heard over radio
    #[serde(default)]
    pub via_mqtt: bool,
    pub timestamp_ms: i64,
}

impl MessageRecord {
    /// Read a message record from any event with a known sender
    ///
    /// Broadcasts have no recipient; the gateway that uplinked them stands
    /// in, since a zero-hop broadcast was heard by that gateway directly.
    pub fn from_event(event: &NormalizedEvent) -> Option<Self> {
        if event.from == NodeId::UNKNOWN {
            return None;
        }
        let to = event.to.or_else(|| {
            event
                .gateway
                .as_deref()
                .and_then(|g| g.parse::<NodeId>().ok())
        });
        Some(Self {
            from: event.from,
            to,
            hops_away: event.signal.hops_away,
            snr: event.signal.snr,
            rssi: event.signal.rssi,
            via_mqtt: event.via_mqtt,
            timestamp_ms: event.timestamp_ms,
        })
    }

    /// Direct-link evidence needs a recipient, zero or one hop and a radio path
    pub fn is_direct(&self) -> bool {
        !self.via_mqtt && self.to.is_some() && matches!(self.hops_away, Some(0) | Some(1))
    }
}

/// Neighbor list reported by one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub reporter: NodeId,
    /// Neighbor id and the SNR the reporter heard it at
    pub neighbors: Vec<(NodeId, Option<f32>)>,
    pub timestamp_ms: i64,
}

impl NeighborRecord {
    pub fn from_event(event: &NormalizedEvent) -> Option<Self> {
        let EventKind::NeighborInfo(report) = &event.kind else {
            return None;
        };
        Some(Self {
            reporter: report.reporter,
            neighbors: report
                .neighbors
                .iter()
                .map(|n| (n.node, n.snr))
                .collect(),
            timestamp_ms: event.timestamp_ms,
        })
    }
}

/// One analysis snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observations {
    pub roster: NodeRoster,
    pub traces: Vec<RouteTraceRecord>,
    pub messages: Vec<MessageRecord>,
    pub neighbors: Vec<NeighborRecord>,
}

impl Observations {
    /// Split a batch of events into analysis inputs
    ///
    /// Decode-error events still count as messages: their envelope proves
    /// the sender was heard even when the content was unreadable.
    pub fn from_events(events: &[NormalizedEvent]) -> Self {
        Self {
            roster: NodeRoster::from_events(events),
            traces: events.iter().filter_map(RouteTraceRecord::from_event).collect(),
            messages: events.iter().filter_map(MessageRecord::from_event).collect(),
            neighbors: events.iter().filter_map(NeighborRecord::from_event).collect(),
        }
    }

    /// Keep only observations inside `window` before `now_ms`
    ///
    /// The roster is kept whole; node positions do not expire.
    pub fn within_window(mut self, now_ms: i64, window: Duration) -> Self {
        let cutoff = now_ms.saturating_sub(duration_ms(window));
        self.traces.retain(|t| t.timestamp_ms >= cutoff);
        self.messages.retain(|m| m.timestamp_ms >= cutoff);
        self.neighbors.retain(|n| n.timestamp_ms >= cutoff);
        self
    }
}

/// Duration in whole milliseconds, clamped to `i64::MAX`
pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlens_core::{PositionReport, RouteTrace, SignalQuality};

    fn event(from: u32, to: Option<u32>, ts: i64, kind: EventKind) -> NormalizedEvent {
        NormalizedEvent {
            packet_id: 1,
            from: NodeId(from),
            to: to.map(NodeId),
            channel: None,
            channel_slot: 0,
            gateway: None,
            timestamp_ms: ts,
            signal: SignalQuality::default(),
            via_mqtt: false,
            encrypted: false,
            kind,
        }
    }

    fn position(lat: f64, lon: f64) -> EventKind {
        EventKind::Position(PositionReport {
            location: Location::new(lat, lon),
            fix_time_ms: None,
            precision_bits: None,
            sats_in_view: None,
            ground_speed: None,
            ground_track: None,
        })
    }

    #[test]
    fn test_roster_keeps_latest_position() {
        let events = vec![
            event(1, None, 200, position(41.0, -105.0)),
            event(1, None, 100, position(40.0, -105.0)),
        ];
        let roster = NodeRoster::from_events(&events);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.position_of(&NodeId(1)).unwrap().latitude, 41.0);
        assert_eq!(roster.get(&NodeId(1)).unwrap().last_heard_ms, Some(200));
    }

    #[test]
    fn test_trace_from_responder_event() {
        let trace = RouteTrace {
            route: vec![NodeId(2)],
            snr_towards: vec![Some(5.0), Some(-3.0)],
            route_back: Some(vec![NodeId(4)]),
            snr_back: Some(vec![None, Some(1.0)]),
            request_id: Some(42),
        };
        let record =
            RouteTraceRecord::from_event(&event(3, Some(1), 10, EventKind::RouteTrace(trace)))
                .unwrap();

        assert_eq!(record.from, NodeId(1));
        assert_eq!(record.to, NodeId(3));
        assert_eq!(
            record.outbound_hops(),
            vec![NodeId(1), NodeId(2), NodeId(3)]
        );
        assert_eq!(
            record.return_hops().unwrap(),
            vec![NodeId(3), NodeId(4), NodeId(1)]
        );
        assert_eq!(
            record.outbound_links(),
            vec![
                (NodeId(1), NodeId(2), Some(5.0)),
                (NodeId(2), NodeId(3), Some(-3.0))
            ]
        );
        assert_eq!(record.return_links()[0].2, None);
    }

    #[test]
    fn test_overheard_trace_request_is_ignored() {
        let request = RouteTrace {
            route: vec![NodeId(2)],
            ..Default::default()
        };
        let e = event(1, Some(3), 10, EventKind::RouteTrace(request));
        assert!(RouteTraceRecord::from_event(&e).is_none());
        assert!(Observations::from_events(&[e]).traces.is_empty());
    }

    #[test]
    fn test_broadcast_trace_is_ignored() {
        let kind = EventKind::RouteTrace(RouteTrace::default());
        assert!(RouteTraceRecord::from_event(&event(3, None, 0, kind)).is_none());
    }

    #[test]
    fn test_message_direct_rule() {
        let mut msg = MessageRecord {
            from: NodeId(1),
            to: Some(NodeId(2)),
            hops_away: Some(1),
            snr: None,
            rssi: None,
            via_mqtt: false,
            timestamp_ms: 0,
        };
        assert!(msg.is_direct());
        msg.hops_away = Some(2);
        assert!(!msg.is_direct());
        msg.hops_away = None;
        assert!(!msg.is_direct());
    }

    #[test]
    fn test_broker_relayed_broadcast_is_not_direct() {
        let mut e = event(1, None, 0, EventKind::Text { text: "x".into() });
        e.gateway = Some("!0000000a".into());
        e.signal = SignalQuality::new(None, None, Some(3), Some(3));
        e.via_mqtt = true;
        let record = MessageRecord::from_event(&e).unwrap();
        assert_eq!(record.hops_away, Some(0));
        assert!(!record.is_direct());

        let mut builder = crate::graph::GraphBuilder::new();
        assert!(!builder.add_message(&record));
    }

    #[test]
    fn test_broadcast_uses_gateway_as_recipient() {
        let mut e = event(1, None, 0, EventKind::Text { text: "x".into() });
        e.gateway = Some("!0000000a".into());
        let record = MessageRecord::from_event(&e).unwrap();
        assert_eq!(record.to, Some(NodeId(0xa)));
    }

    #[test]
    fn test_window_filter() {
        let obs = Observations {
            messages: vec![
                MessageRecord {
                    from: NodeId(1),
                    to: None,
                    hops_away: None,
                    snr: None,
                    rssi: None,
                    via_mqtt: false,
                    timestamp_ms: 1_000,
                },
                MessageRecord {
                    from: NodeId(2),
                    to: None,
                    hops_away: None,
                    snr: None,
                    rssi: None,
                    via_mqtt: false,
                    timestamp_ms: 9_000,
                },
            ],
            ..Default::default()
        };
        let filtered = obs.within_window(10_000, Duration::from_secs(5));
        assert_eq!(filtered.messages.len(), 1);
        assert_eq!(filtered.messages[0].from, NodeId(2));
    }

    #[test]
    fn test_huge_window_keeps_everything() {
        let obs = Observations {
            neighbors: vec![NeighborRecord {
                reporter: NodeId(1),
                neighbors: vec![],
                timestamp_ms: 0,
            }],
            ..Default::default()
        };
        // Far beyond i64::MAX milliseconds
        let filtered = obs.within_window(10_000, Duration::from_secs(u64::MAX));
        assert_eq!(filtered.neighbors.len(), 1);
        assert_eq!(duration_ms(Duration::from_secs(u64::MAX)), i64::MAX);
    }
}
