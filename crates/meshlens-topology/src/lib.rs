//! Topology and coverage analysis for mesh networks
//!
//! Works on bounded snapshots of normalized events or storage records and
//! keeps no state between calls, so analyses can run concurrently on
//! different snapshots.
//!
//! # Modules
//!
//! - [`observations`] - Analysis inputs: node roster, traces, messages
//! - [`graph`] - Undirected connectivity graph
//! - [`classify`] - Hubs, bridges, isolated nodes and overlapping pairs
//! - [`coverage`] - Environment classification and coverage area
//! - [`router`] - Directed weighted routing over observed traces
//! - [`report`] - Combined, serializable network report
//!
//! # Example
//!
//! ```rust
//! use meshlens_core::NodeId;
//! use meshlens_topology::{RouteTraceRecord, RoutingGraph};
//!
//! let trace = RouteTraceRecord::new(NodeId(1), NodeId(3), vec![NodeId(2)], 0);
//! let graph = RoutingGraph::from_traces(&[trace], 0);
//! let path = graph.shortest_path(NodeId(1), NodeId(3)).unwrap();
//! assert_eq!(path.hop_count, 2);
//! ```

pub mod classify;
pub mod coverage;
pub mod error;
pub mod graph;
pub mod observations;
pub mod report;
pub mod router;

pub use classify::{classify, hub_threshold, OverlappingPair, TopologySummary};
pub use coverage::{estimate_coverage, CoverageAnalysis, CoverageEstimate, Environment, RangeKm};
pub use error::{Result, TopologyError};
pub use graph::{build_connectivity_graph, ConnectivityGraph, GraphBuilder, NetworkLink};
pub use observations::{
    MessageRecord, NeighborRecord, NodeRecord, NodeRoster, Observations, RouteTraceRecord,
};
pub use report::{analyze, routing_graph, NetworkReport};
pub use router::{PathResult, RouteEdge, RoutingGraph};
