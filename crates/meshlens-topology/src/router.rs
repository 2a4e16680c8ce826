//! Weighted routing over observed route traces
//!
//! Each consecutive hop pair of a trace is a directed edge. Return paths
//! add their own edges; the two directions are never merged. Edge weight
//! falls with repeated observation and good SNR and rises with age, so the
//! cheapest path is the one the mesh has most recently and most often used.

use meshlens_core::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{Result, TopologyError};
use crate::observations::{duration_ms, RouteTraceRecord};

/// Paths returned by [`RoutingGraph::enumerate_paths`] at most
pub const MAX_ENUMERATED_PATHS: usize = 10;

/// Partial paths explored by one enumeration before giving up
const MAX_ENUMERATION_EXPANSIONS: usize = 10_000;

/// Age after which an edge makes a path unreliable
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Aggregated observations of one directed hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub observations: u32,
    /// Mean SNR over observations that reported one
    pub avg_snr: Option<f32>,
    pub last_seen_ms: i64,
    pub weight: f64,
    #[serde(skip)]
    snr_samples: u32,
}

impl RouteEdge {
    fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            observations: 0,
            avg_snr: None,
            last_seen_ms: i64::MIN,
            weight: 0.0,
            snr_samples: 0,
        }
    }

    /// Hours since the edge was last seen, never negative
    pub fn age_hours(&self, now_ms: i64) -> f64 {
        (now_ms.saturating_sub(self.last_seen_ms)).max(0) as f64 / MS_PER_HOUR
    }

    /// Weight of this edge at `now_ms`
    pub fn compute_weight(&self, now_ms: i64) -> f64 {
        let reliability = (3.0 - (self.observations as f64 + 1.0).log2()).max(1.0);
        let recency = 1.0 + (self.age_hours(now_ms) / 24.0).min(1.0);
        let snr = self.avg_snr.map(f64::from).unwrap_or(0.0);
        let snr_factor = (1.0 + (0.0 - snr) / 20.0).max(0.5);
        reliability * recency * snr_factor
    }

    pub fn is_stale(&self, now_ms: i64, stale_after: Duration) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) > duration_ms(stale_after)
    }
}

/// Result of a shortest-path query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Hops from start to end inclusive
    pub path: Vec<NodeId>,
    pub total_weight: f64,
    pub hop_count: usize,
    /// False when any edge on the path is stale
    pub reliable: bool,
    /// Number of stale edges on the path
    pub stale_edges: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    node: NodeId,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost, ties broken by node id for determinism
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Directed graph of observed hops
#[derive(Debug, Clone)]
pub struct RoutingGraph {
    edges: BTreeMap<NodeId, BTreeMap<NodeId, RouteEdge>>,
    nodes: BTreeSet<NodeId>,
    now_ms: i64,
    stale_after: Duration,
}

impl RoutingGraph {
    /// Empty graph evaluated at `now_ms`
    pub fn new(now_ms: i64) -> Self {
        Self {
            edges: BTreeMap::new(),
            nodes: BTreeSet::new(),
            now_ms,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Build from route traces, outbound and return hops alike
    pub fn from_traces(traces: &[RouteTraceRecord], now_ms: i64) -> Self {
        let mut graph = Self::new(now_ms);
        for record in traces {
            graph.add_trace(record);
        }
        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edge_count(),
            "Built routing graph"
        );
        graph
    }

    /// Change the staleness threshold
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn add_trace(&mut self, record: &RouteTraceRecord) {
        for (from, to, snr) in record
            .outbound_links()
            .into_iter()
            .chain(record.return_links())
        {
            self.add_observation(from, to, snr, record.timestamp_ms);
        }
    }

    /// Record one directed hop observation
    pub fn add_observation(&mut self, from: NodeId, to: NodeId, snr: Option<f32>, timestamp_ms: i64) {
        if from == to || from == NodeId::UNKNOWN || to == NodeId::UNKNOWN {
            return;
        }
        self.nodes.insert(from);
        self.nodes.insert(to);

        let edge = self
            .edges
            .entry(from)
            .or_default()
            .entry(to)
            .or_insert_with(|| RouteEdge::new(from, to));
        edge.observations += 1;
        edge.last_seen_ms = edge.last_seen_ms.max(timestamp_ms);
        if let Some(snr) = snr.filter(|v| v.is_finite()) {
            edge.snr_samples += 1;
            edge.avg_snr = Some(match edge.avg_snr {
                Some(mean) => mean + (snr - mean) / edge.snr_samples as f32,
                None => snr,
            });
        }
        edge.weight = edge.compute_weight(self.now_ms);
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn edge(&self, from: NodeId, to: NodeId) -> Option<&RouteEdge> {
        self.edges.get(&from).and_then(|out| out.get(&to))
    }

    /// All edges, ordered by source then destination
    pub fn edges(&self) -> impl Iterator<Item = &RouteEdge> {
        self.edges.values().flat_map(|out| out.values())
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    fn successors(&self, node: NodeId) -> impl Iterator<Item = &RouteEdge> {
        self.edges.get(&node).into_iter().flat_map(|out| out.values())
    }

    fn require(&self, node: NodeId) -> Result<()> {
        if self.contains(node) {
            Ok(())
        } else {
            Err(TopologyError::UnknownNode(node))
        }
    }

    /// Cheapest path by edge weight (Dijkstra)
    pub fn shortest_path(&self, start: NodeId, end: NodeId) -> Result<PathResult> {
        self.require(start)?;
        self.require(end)?;

        let mut dist: BTreeMap<NodeId, f64> = BTreeMap::new();
        let mut prev: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut heap = BinaryHeap::new();

        dist.insert(start, 0.0);
        heap.push(State {
            cost: 0.0,
            node: start,
        });

        while let Some(State { cost, node }) = heap.pop() {
            if node == end {
                break;
            }
            if cost > dist.get(&node).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            for edge in self.successors(node) {
                let next = cost + edge.weight;
                if next < dist.get(&edge.to).copied().unwrap_or(f64::INFINITY) {
                    dist.insert(edge.to, next);
                    prev.insert(edge.to, node);
                    heap.push(State {
                        cost: next,
                        node: edge.to,
                    });
                }
            }
        }

        let total_weight = dist
            .get(&end)
            .copied()
            .ok_or(TopologyError::NoPath { start, end })?;

        let mut path = vec![end];
        let mut cursor = end;
        while cursor != start {
            cursor = *prev
                .get(&cursor)
                .ok_or(TopologyError::NoPath { start, end })?;
            path.push(cursor);
        }
        path.reverse();

        let stale_edges = path
            .windows(2)
            .filter_map(|hop| self.edge(hop[0], hop[1]))
            .filter(|e| e.is_stale(self.now_ms, self.stale_after))
            .count();

        trace!(%start, %end, hops = path.len() - 1, total_weight, "Shortest path");

        Ok(PathResult {
            hop_count: path.len() - 1,
            path,
            total_weight,
            reliable: stale_edges == 0,
            stale_edges,
        })
    }

    /// Simple paths of at most `max_hops` hops, shortest first
    ///
    /// Breadth-first and bounded: returns at most
    /// [`MAX_ENUMERATED_PATHS`] paths and stops early on large graphs, so
    /// the list is a sample for display, not every path.
    pub fn enumerate_paths(&self, start: NodeId, end: NodeId, max_hops: usize) -> Vec<Vec<NodeId>> {
        if !self.contains(start) || !self.contains(end) {
            return Vec::new();
        }
        if start == end {
            return vec![vec![start]];
        }

        let mut found = Vec::new();
        let mut queue = VecDeque::from([vec![start]]);
        let mut expansions = 0;

        while let Some(path) = queue.pop_front() {
            expansions += 1;
            if expansions > MAX_ENUMERATION_EXPANSIONS {
                debug!(%start, %end, "Path enumeration hit expansion limit");
                break;
            }
            if path.len() > max_hops {
                continue;
            }
            let Some(&last) = path.last() else {
                continue;
            };
            for edge in self.successors(last) {
                if path.contains(&edge.to) {
                    continue;
                }
                let mut next = path.clone();
                next.push(edge.to);
                if edge.to == end {
                    found.push(next);
                    if found.len() == MAX_ENUMERATED_PATHS {
                        return found;
                    }
                } else {
                    queue.push_back(next);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    fn linear() -> RoutingGraph {
        let trace = RouteTraceRecord::new(NodeId(1), NodeId(3), vec![NodeId(2)], 0);
        RoutingGraph::from_traces(&[trace], 0)
    }

    #[test]
    fn test_weight_formula() {
        let mut edge = RouteEdge::new(NodeId(1), NodeId(2));
        edge.observations = 1;
        edge.last_seen_ms = 0;
        // 3 - log2(2) = 2, fresh, 0 dB
        assert!((edge.compute_weight(0) - 2.0).abs() < 1e-9);

        edge.observations = 7;
        // floor of 1
        assert!((edge.compute_weight(0) - 1.0).abs() < 1e-9);

        // 12h old: recency 1.5
        assert!((edge.compute_weight(12 * HOUR_MS) - 1.5).abs() < 1e-9);
        // capped at 2x
        assert!((edge.compute_weight(100 * HOUR_MS) - 2.0).abs() < 1e-9);

        edge.avg_snr = Some(-10.0);
        assert!((edge.compute_weight(0) - 1.5).abs() < 1e-9);
        edge.avg_snr = Some(30.0);
        assert!((edge.compute_weight(0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_linear_shortest_path() {
        let graph = linear();
        let result = graph.shortest_path(NodeId(1), NodeId(3)).unwrap();
        assert_eq!(result.path, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(result.hop_count, 2);
        let expected = graph.edge(NodeId(1), NodeId(2)).unwrap().weight
            + graph.edge(NodeId(2), NodeId(3)).unwrap().weight;
        assert!((result.total_weight - expected).abs() < 1e-12);
        assert!(result.reliable);
    }

    #[test]
    fn test_edges_are_directed() {
        let graph = linear();
        assert_eq!(
            graph.shortest_path(NodeId(3), NodeId(1)),
            Err(TopologyError::NoPath {
                start: NodeId(3),
                end: NodeId(1)
            })
        );
    }

    #[test]
    fn test_unknown_endpoint() {
        assert_eq!(
            linear().shortest_path(NodeId(1), NodeId(9)),
            Err(TopologyError::UnknownNode(NodeId(9)))
        );
    }

    #[test]
    fn test_same_start_and_end() {
        let result = linear().shortest_path(NodeId(2), NodeId(2)).unwrap();
        assert_eq!(result.path, vec![NodeId(2)]);
        assert_eq!(result.hop_count, 0);
        assert_eq!(result.total_weight, 0.0);
    }

    #[test]
    fn test_prefers_frequently_seen_route() {
        let mut traces = vec![RouteTraceRecord::new(NodeId(1), NodeId(4), vec![NodeId(2)], 0)];
        for _ in 0..6 {
            traces.push(RouteTraceRecord::new(NodeId(1), NodeId(4), vec![NodeId(3)], 0));
        }
        let graph = RoutingGraph::from_traces(&traces, 0);
        let result = graph.shortest_path(NodeId(1), NodeId(4)).unwrap();
        assert_eq!(result.path, vec![NodeId(1), NodeId(3), NodeId(4)]);
    }

    #[test]
    fn test_stale_edge_marks_path_unreliable() {
        let trace = RouteTraceRecord::new(NodeId(1), NodeId(2), vec![], 0);
        let graph = RoutingGraph::from_traces(&[trace], 2 * HOUR_MS);
        let result = graph.shortest_path(NodeId(1), NodeId(2)).unwrap();
        assert!(!result.reliable);
        assert_eq!(result.stale_edges, 1);

        let relaxed = RoutingGraph::from_traces(
            &[RouteTraceRecord::new(NodeId(1), NodeId(2), vec![], 0)],
            2 * HOUR_MS,
        )
        .with_stale_after(Duration::from_secs(3 * 3600));
        assert!(relaxed.shortest_path(NodeId(1), NodeId(2)).unwrap().reliable);
    }

    #[test]
    fn test_unbounded_stale_after_never_marks_stale() {
        let mut edge = RouteEdge::new(NodeId(1), NodeId(2));
        edge.last_seen_ms = 0;
        assert!(!edge.is_stale(i64::MAX, Duration::from_secs(u64::MAX)));
        assert!(edge.is_stale(2 * HOUR_MS, DEFAULT_STALE_AFTER));
    }

    #[test]
    fn test_return_path_adds_reverse_edges() {
        let trace = RouteTraceRecord {
            route_back: Some(vec![NodeId(2)]),
            ..RouteTraceRecord::new(NodeId(1), NodeId(3), vec![NodeId(2)], 0)
        };
        let graph = RoutingGraph::from_traces(&[trace], 0);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.shortest_path(NodeId(3), NodeId(1)).is_ok());
    }

    #[test]
    fn test_enumerate_paths_sorted_and_bounded() {
        let traces = vec![
            RouteTraceRecord::new(NodeId(1), NodeId(4), vec![], 0),
            RouteTraceRecord::new(NodeId(1), NodeId(4), vec![NodeId(2)], 0),
            RouteTraceRecord::new(NodeId(1), NodeId(4), vec![NodeId(2), NodeId(3)], 0),
        ];
        let graph = RoutingGraph::from_traces(&traces, 0);
        let paths = graph.enumerate_paths(NodeId(1), NodeId(4), 7);
        assert_eq!(paths.len(), 3);
        assert!(paths.windows(2).all(|w| w[0].len() <= w[1].len()));
        assert_eq!(paths[0], vec![NodeId(1), NodeId(4)]);

        let short = graph.enumerate_paths(NodeId(1), NodeId(4), 2);
        assert_eq!(short.len(), 2);
        assert!(graph.enumerate_paths(NodeId(1), NodeId(99), 7).is_empty());
    }

    #[test]
    fn test_enumerate_caps_results() {
        // 12 parallel relays between 1 and 100
        let traces: Vec<_> = (10..22)
            .map(|relay| RouteTraceRecord::new(NodeId(1), NodeId(100), vec![NodeId(relay)], 0))
            .collect();
        let graph = RoutingGraph::from_traces(&traces, 0);
        assert_eq!(
            graph.enumerate_paths(NodeId(1), NodeId(100), 7).len(),
            MAX_ENUMERATED_PATHS
        );
    }
}
