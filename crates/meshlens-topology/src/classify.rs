//! Node classification over a connectivity graph
//!
//! Everything here is derived from the link set on each call; nothing is
//! cached between graphs.

use meshlens_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::graph::ConnectivityGraph;

/// Smallest neighbor count that can make a hub
pub const MIN_HUB_NEIGHBORS: usize = 3;

/// A hub must neighbor at least one in this many nodes
pub const HUB_SHARE_DIVISOR: usize = 5;

/// Two nodes with at least one common neighbor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlappingPair {
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub shared_neighbors: Vec<NodeId>,
}

/// Derived roles of nodes in one graph, all lists sorted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySummary {
    pub hubs: Vec<NodeId>,
    pub bridges: Vec<NodeId>,
    pub isolated: Vec<NodeId>,
    pub overlapping_pairs: Vec<OverlappingPair>,
}

/// Neighbor count a node needs to be a hub in a graph of `node_count` nodes
pub fn hub_threshold(node_count: usize) -> usize {
    node_count
        .div_ceil(HUB_SHARE_DIVISOR)
        .max(MIN_HUB_NEIGHBORS)
}

/// Classify every node of the graph
///
/// A bridge is a node with two neighbors that are not linked to each
/// other. This only looks one hop out, so it is not a full articulation
/// point test.
pub fn classify(graph: &ConnectivityGraph) -> TopologySummary {
    debug_assert!(
        graph.links().iter().all(|l| l.node_a < l.node_b),
        "link with non-canonical node order"
    );

    let adjacency = graph.adjacency();
    let threshold = hub_threshold(graph.node_count());
    let mut summary = TopologySummary::default();

    for (node, neighbors) in &adjacency {
        if neighbors.is_empty() {
            summary.isolated.push(*node);
            continue;
        }
        if neighbors.len() >= threshold {
            summary.hubs.push(*node);
        }
        if is_local_bridge(neighbors, &adjacency) {
            summary.bridges.push(*node);
        }
    }

    summary.overlapping_pairs = overlapping_pairs(&adjacency);
    summary
}

fn is_local_bridge(
    neighbors: &BTreeSet<NodeId>,
    adjacency: &BTreeMap<NodeId, BTreeSet<NodeId>>,
) -> bool {
    if neighbors.len() < 2 {
        return false;
    }
    let list: Vec<&NodeId> = neighbors.iter().collect();
    list.iter().enumerate().any(|(i, a)| {
        list[i + 1..].iter().any(|b| {
            !adjacency
                .get(*a)
                .map(|set| set.contains(*b))
                .unwrap_or(false)
        })
    })
}

fn overlapping_pairs(adjacency: &BTreeMap<NodeId, BTreeSet<NodeId>>) -> Vec<OverlappingPair> {
    // Every pair of neighbors around a middle node shares that node
    let mut shared: BTreeMap<(NodeId, NodeId), BTreeSet<NodeId>> = BTreeMap::new();
    for (middle, neighbors) in adjacency {
        let list: Vec<NodeId> = neighbors.iter().copied().collect();
        for (i, a) in list.iter().enumerate() {
            for b in &list[i + 1..] {
                shared.entry((*a, *b)).or_default().insert(*middle);
            }
        }
    }

    shared
        .into_iter()
        .map(|((node_a, node_b), middles)| OverlappingPair {
            node_a,
            node_b,
            shared_neighbors: middles.into_iter().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::observations::{NodeRecord, NodeRoster};

    fn graph(edges: &[(u32, u32)], extra_nodes: &[u32]) -> ConnectivityGraph {
        let mut builder = GraphBuilder::new();
        for (a, b) in edges {
            builder.observe(NodeId(*a), NodeId(*b), None, None, 0);
        }
        let roster: NodeRoster = extra_nodes
            .iter()
            .map(|n| NodeRecord::new(NodeId(*n)))
            .collect();
        builder.build(&roster)
    }

    #[test]
    fn test_hub_threshold_floor_and_share() {
        assert_eq!(hub_threshold(1), 3);
        assert_eq!(hub_threshold(15), 3);
        assert_eq!(hub_threshold(16), 4);
        assert_eq!(hub_threshold(50), 10);
    }

    #[test]
    fn test_star_center_is_hub_and_bridge() {
        let summary = classify(&graph(&[(1, 2), (1, 3), (1, 4)], &[]));
        assert_eq!(summary.hubs, vec![NodeId(1)]);
        assert_eq!(summary.bridges, vec![NodeId(1)]);
        assert!(summary.isolated.is_empty());
    }

    #[test]
    fn test_two_neighbors_is_not_hub() {
        let summary = classify(&graph(&[(1, 2), (1, 3)], &[]));
        assert!(summary.hubs.is_empty());
    }

    #[test]
    fn test_triangle_has_no_bridges() {
        let summary = classify(&graph(&[(1, 2), (2, 3), (1, 3)], &[]));
        assert!(summary.bridges.is_empty());
        assert_eq!(summary.overlapping_pairs.len(), 3);
    }

    #[test]
    fn test_isolated_only_in_isolated_list() {
        let summary = classify(&graph(&[(1, 2), (1, 3), (1, 4)], &[9]));
        assert_eq!(summary.isolated, vec![NodeId(9)]);
        assert!(!summary.hubs.contains(&NodeId(9)));
        assert!(!summary.bridges.contains(&NodeId(9)));
        assert!(summary
            .overlapping_pairs
            .iter()
            .all(|p| p.node_a != NodeId(9) && p.node_b != NodeId(9)));
    }

    #[test]
    fn test_overlap_through_shared_neighbor() {
        let summary = classify(&graph(&[(0xa, 0xb), (0xc, 0xb)], &[]));
        assert_eq!(
            summary.overlapping_pairs,
            vec![OverlappingPair {
                node_a: NodeId(0xa),
                node_b: NodeId(0xc),
                shared_neighbors: vec![NodeId(0xb)],
            }]
        );
        assert_eq!(summary.bridges, vec![NodeId(0xb)]);
    }

    #[test]
    fn test_empty_graph() {
        assert_eq!(classify(&ConnectivityGraph::default()), TopologySummary::default());
    }
}
