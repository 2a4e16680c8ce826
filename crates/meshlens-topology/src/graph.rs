//! Undirected connectivity graph
//!
//! Links come from three kinds of evidence: consecutive hops of route
//! traces, messages heard directly (zero or one hop), and neighbor lists.
//! Every observation of the same node pair lands on one [`NetworkLink`]
//! keyed by the ordered pair, so the graph does not depend on the order
//! the evidence arrives in.

use meshlens_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::observations::{MessageRecord, NeighborRecord, NodeRoster, RouteTraceRecord};

const SEEN_A_TO_B: u8 = 0b01;
const SEEN_B_TO_A: u8 = 0b10;

/// One undirected link; `node_a < node_b` always holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLink {
    pub node_a: NodeId,
    pub node_b: NodeId,
    /// Running average SNR in dB over observations that carried one
    pub snr: Option<f32>,
    /// Running average RSSI in dBm
    pub rssi: Option<f32>,
    /// Great-circle length when both ends have a position
    pub distance_km: Option<f64>,
    pub seen_count: u32,
    pub last_seen_ms: i64,
    /// Observed in both directions
    pub bidirectional: bool,
    #[serde(skip)]
    directions: u8,
    #[serde(skip)]
    snr_samples: u32,
    #[serde(skip)]
    rssi_samples: u32,
}

impl NetworkLink {
    fn new(a: NodeId, b: NodeId) -> Self {
        let (node_a, node_b) = canonical_pair(a, b);
        Self {
            node_a,
            node_b,
            snr: None,
            rssi: None,
            distance_km: None,
            seen_count: 0,
            last_seen_ms: i64::MIN,
            bidirectional: false,
            directions: 0,
            snr_samples: 0,
            rssi_samples: 0,
        }
    }

    /// Ordered key of this link
    pub fn key(&self) -> (NodeId, NodeId) {
        (self.node_a, self.node_b)
    }

    /// Check whether `node` is one of the endpoints
    pub fn touches(&self, node: NodeId) -> bool {
        self.node_a == node || self.node_b == node
    }

    /// The endpoint that is not `node`
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.node_a {
            Some(self.node_b)
        } else if node == self.node_b {
            Some(self.node_a)
        } else {
            None
        }
    }

    fn record(&mut self, from: NodeId, snr: Option<f32>, rssi: Option<i32>, timestamp_ms: i64) {
        self.seen_count += 1;
        self.last_seen_ms = self.last_seen_ms.max(timestamp_ms);
        self.directions |= if from == self.node_a {
            SEEN_A_TO_B
        } else {
            SEEN_B_TO_A
        };
        self.bidirectional = self.directions == SEEN_A_TO_B | SEEN_B_TO_A;

        if let Some(snr) = snr.filter(|v| v.is_finite()) {
            self.snr_samples += 1;
            self.snr = Some(running_mean(self.snr, snr, self.snr_samples));
        }
        if let Some(rssi) = rssi {
            self.rssi_samples += 1;
            self.rssi = Some(running_mean(self.rssi, rssi as f32, self.rssi_samples));
        }
    }
}

fn running_mean(current: Option<f32>, sample: f32, count: u32) -> f32 {
    match current {
        Some(mean) => mean + (sample - mean) / count as f32,
        None => sample,
    }
}

/// Order a node pair so the smaller id comes first
pub fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn is_real_node(id: NodeId) -> bool {
    id != NodeId::UNKNOWN && !id.is_broadcast()
}

/// Accumulates link evidence
#[derive(Debug, Default)]
pub struct GraphBuilder {
    links: BTreeMap<(NodeId, NodeId), NetworkLink>,
    nodes: BTreeSet<NodeId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one directed observation of the pair
    ///
    /// Self links and placeholder ids are ignored. Returns whether the
    /// observation was kept.
    pub fn observe(
        &mut self,
        from: NodeId,
        to: NodeId,
        snr: Option<f32>,
        rssi: Option<i32>,
        timestamp_ms: i64,
    ) -> bool {
        if from == to || !is_real_node(from) || !is_real_node(to) {
            return false;
        }
        self.nodes.insert(from);
        self.nodes.insert(to);
        self.links
            .entry(canonical_pair(from, to))
            .or_insert_with(|| NetworkLink::new(from, to))
            .record(from, snr, rssi, timestamp_ms);
        true
    }

    /// Every consecutive hop pair of a trace, outbound and return
    pub fn add_trace(&mut self, trace: &RouteTraceRecord) {
        for (from, to, snr) in trace
            .outbound_links()
            .into_iter()
            .chain(trace.return_links())
        {
            self.observe(from, to, snr, None, trace.timestamp_ms);
        }
    }

    /// A message heard directly, zero or one hop away
    ///
    /// Multi-hop messages say nothing about the intermediate links and are
    /// skipped, as are messages with unknown hop counts.
    pub fn add_message(&mut self, message: &MessageRecord) -> bool {
        match message.to {
            Some(to) if message.is_direct() => self.observe(
                message.from,
                to,
                message.snr,
                message.rssi,
                message.timestamp_ms,
            ),
            _ => false,
        }
    }

    /// Neighbor list: each neighbor was heard by the reporter
    pub fn add_neighbor_report(&mut self, report: &NeighborRecord) {
        for (neighbor, snr) in &report.neighbors {
            self.observe(*neighbor, report.reporter, *snr, None, report.timestamp_ms);
        }
    }

    /// Finish the graph, adding roster nodes and link distances
    pub fn build(mut self, roster: &NodeRoster) -> ConnectivityGraph {
        for record in roster.iter().filter(|r| is_real_node(r.id)) {
            self.nodes.insert(record.id);
        }

        let mut links: Vec<NetworkLink> = self.links.into_values().collect();
        for link in &mut links {
            if let (Some(a), Some(b)) = (
                roster.position_of(&link.node_a),
                roster.position_of(&link.node_b),
            ) {
                link.distance_km = Some(a.distance_km(b));
            }
        }

        debug!(
            nodes = self.nodes.len(),
            links = links.len(),
            "Built connectivity graph"
        );

        ConnectivityGraph {
            nodes: self.nodes.into_iter().collect(),
            links,
        }
    }
}

/// Links plus every node known to the snapshot
///
/// Both lists are sorted; links by their ordered node pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityGraph {
    nodes: Vec<NodeId>,
    links: Vec<NetworkLink>,
}

impl ConnectivityGraph {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn links(&self) -> &[NetworkLink] {
        &self.links
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Link between two nodes, in either order
    pub fn link(&self, a: NodeId, b: NodeId) -> Option<&NetworkLink> {
        let key = canonical_pair(a, b);
        self.links
            .binary_search_by(|l| l.key().cmp(&key))
            .ok()
            .map(|i| &self.links[i])
    }

    pub fn has_link(&self, a: NodeId, b: NodeId) -> bool {
        self.link(a, b).is_some()
    }

    /// Neighbor sets for every node, empty for nodes without links
    pub fn adjacency(&self) -> BTreeMap<NodeId, BTreeSet<NodeId>> {
        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> = self
            .nodes
            .iter()
            .map(|n| (*n, BTreeSet::new()))
            .collect();
        for link in &self.links {
            adjacency.entry(link.node_a).or_default().insert(link.node_b);
            adjacency.entry(link.node_b).or_default().insert(link.node_a);
        }
        adjacency
    }

    /// Neighbors of one node
    pub fn neighbors(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.links.iter().filter_map(|l| l.other(node)).collect()
    }
}

/// Build the connectivity graph from a roster, traces and messages
pub fn build_connectivity_graph(
    roster: &NodeRoster,
    traces: &[RouteTraceRecord],
    messages: &[MessageRecord],
) -> ConnectivityGraph {
    let mut builder = GraphBuilder::new();
    for trace in traces {
        builder.add_trace(trace);
    }
    for message in messages {
        builder.add_message(message);
    }
    builder.build(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observations::NodeRecord;
    use meshlens_core::Location;

    fn direct(from: u32, to: u32, hops: Option<u8>, snr: Option<f32>, ts: i64) -> MessageRecord {
        MessageRecord {
            from: NodeId(from),
            to: Some(NodeId(to)),
            hops_away: hops,
            snr,
            rssi: None,
            via_mqtt: false,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_link_is_order_independent() {
        let forward = build_connectivity_graph(
            &NodeRoster::new(),
            &[],
            &[direct(5, 2, Some(0), None, 0)],
        );
        let backward = build_connectivity_graph(
            &NodeRoster::new(),
            &[],
            &[direct(2, 5, Some(0), None, 0)],
        );
        assert_eq!(forward.link_count(), 1);
        assert_eq!(forward.links()[0].key(), backward.links()[0].key());
        assert_eq!(forward.links()[0].node_a, NodeId(2));
    }

    #[test]
    fn test_running_average_and_last_seen() {
        let graph = build_connectivity_graph(
            &NodeRoster::new(),
            &[],
            &[
                direct(1, 2, Some(0), Some(4.0), 300),
                direct(2, 1, Some(1), Some(-2.0), 100),
                direct(1, 2, Some(0), None, 200),
            ],
        );
        let link = graph.link(NodeId(2), NodeId(1)).unwrap();
        assert_eq!(link.seen_count, 3);
        assert_eq!(link.snr, Some(1.0));
        assert_eq!(link.last_seen_ms, 300);
        assert!(link.bidirectional);
    }

    #[test]
    fn test_multi_hop_messages_are_not_links() {
        let graph = build_connectivity_graph(
            &NodeRoster::new(),
            &[],
            &[direct(1, 2, Some(2), None, 0), direct(1, 3, None, None, 0)],
        );
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn test_trace_hops_become_links() {
        let trace = RouteTraceRecord {
            snr_towards: vec![Some(6.0), Some(2.0)],
            ..RouteTraceRecord::new(NodeId(1), NodeId(3), vec![NodeId(2)], 0)
        };
        let graph = build_connectivity_graph(&NodeRoster::new(), &[trace], &[]);
        assert_eq!(graph.link_count(), 2);
        assert_eq!(graph.link(NodeId(1), NodeId(2)).unwrap().snr, Some(6.0));
        assert_eq!(graph.link(NodeId(2), NodeId(3)).unwrap().snr, Some(2.0));
        assert!(!graph.link(NodeId(1), NodeId(2)).unwrap().bidirectional);
    }

    #[test]
    fn test_return_path_marks_bidirectional() {
        let trace = RouteTraceRecord {
            route_back: Some(vec![NodeId(2)]),
            ..RouteTraceRecord::new(NodeId(1), NodeId(3), vec![NodeId(2)], 0)
        };
        let graph = build_connectivity_graph(&NodeRoster::new(), &[trace], &[]);
        assert!(graph.links().iter().all(|l| l.bidirectional && l.seen_count == 2));
    }

    #[test]
    fn test_placeholder_and_self_links_skipped() {
        let mut builder = GraphBuilder::new();
        assert!(!builder.observe(NodeId(1), NodeId(1), None, None, 0));
        assert!(!builder.observe(NodeId::UNKNOWN, NodeId(1), None, None, 0));
        assert!(!builder.observe(NodeId(1), NodeId::BROADCAST, None, None, 0));
        assert_eq!(builder.build(&NodeRoster::new()).link_count(), 0);
    }

    #[test]
    fn test_distance_needs_both_positions() {
        let roster: NodeRoster = [
            NodeRecord::new(NodeId(1)).with_position(Location::new(40.0, -105.0)),
            NodeRecord::new(NodeId(2)).with_position(Location::new(40.1, -105.0)),
            NodeRecord::new(NodeId(3)),
        ]
        .into_iter()
        .collect();
        let graph = build_connectivity_graph(
            &roster,
            &[],
            &[direct(1, 2, Some(0), None, 0), direct(2, 3, Some(0), None, 0)],
        );
        let km = graph.link(NodeId(1), NodeId(2)).unwrap().distance_km.unwrap();
        assert!(km > 10.0 && km < 13.0);
        assert!(graph.link(NodeId(2), NodeId(3)).unwrap().distance_km.is_none());
    }

    #[test]
    fn test_roster_nodes_without_links_are_kept() {
        let roster: NodeRoster = [NodeRecord::new(NodeId(9))].into_iter().collect();
        let graph = build_connectivity_graph(&roster, &[], &[]);
        assert_eq!(graph.nodes(), &[NodeId(9)]);
        assert!(graph.adjacency()[&NodeId(9)].is_empty());
    }

    #[test]
    fn test_neighbor_report_links() {
        let mut builder = GraphBuilder::new();
        builder.add_neighbor_report(&NeighborRecord {
            reporter: NodeId(1),
            neighbors: vec![(NodeId(2), Some(3.0)), (NodeId(3), None)],
            timestamp_ms: 0,
        });
        let graph = builder.build(&NodeRoster::new());
        assert_eq!(graph.neighbors(NodeId(1)).len(), 2);
    }
}
