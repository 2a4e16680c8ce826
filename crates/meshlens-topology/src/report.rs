//! Combined network report
//!
//! Ties the graph builder, classifier and coverage estimator together for
//! one snapshot and serializes the result for display.

use meshlens_core::{AnalysisConfig, NormalizedEvent};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::{classify, TopologySummary};
use crate::coverage::{estimate_coverage, CoverageEstimate};
use crate::error::Result;
use crate::graph::{ConnectivityGraph, GraphBuilder};
use crate::observations::{NodeRecord, Observations};
use crate::router::RoutingGraph;

/// Graph, classification and coverage of one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    pub generated_at_ms: i64,
    pub nodes: Vec<NodeRecord>,
    pub graph: ConnectivityGraph,
    pub summary: TopologySummary,
    pub coverage: CoverageEstimate,
}

impl NetworkReport {
    /// Analyze prepared observations
    ///
    /// Neighbor reports count as link evidence alongside traces and
    /// direct messages.
    pub fn from_observations(observations: &Observations, now_ms: i64) -> Self {
        let mut builder = GraphBuilder::new();
        for trace in &observations.traces {
            builder.add_trace(trace);
        }
        for message in &observations.messages {
            builder.add_message(message);
        }
        for report in &observations.neighbors {
            builder.add_neighbor_report(report);
        }
        let graph = builder.build(&observations.roster);
        let summary = classify(&graph);
        let coverage = estimate_coverage(&observations.roster);

        info!(
            nodes = graph.node_count(),
            links = graph.link_count(),
            hubs = summary.hubs.len(),
            isolated = summary.isolated.len(),
            "Network analysis complete"
        );

        Self {
            generated_at_ms: now_ms,
            nodes: observations.roster.iter().cloned().collect(),
            graph,
            summary,
            coverage,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Analyze a batch of events inside the configured window
pub fn analyze(events: &[NormalizedEvent], config: &AnalysisConfig, now_ms: i64) -> NetworkReport {
    let observations = Observations::from_events(events).within_window(now_ms, config.window);
    NetworkReport::from_observations(&observations, now_ms)
}

/// Routing graph for a batch of events inside the configured window
pub fn routing_graph(
    events: &[NormalizedEvent],
    config: &AnalysisConfig,
    now_ms: i64,
) -> RoutingGraph {
    let observations = Observations::from_events(events).within_window(now_ms, config.window);
    RoutingGraph::from_traces(&observations.traces, now_ms).with_stale_after(config.stale_edge_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observations::{MessageRecord, NodeRoster};
    use meshlens_core::{Location, NodeId};

    #[test]
    fn test_report_from_observations() {
        let roster: NodeRoster = [
            NodeRecord::new(NodeId(1)).with_position(Location::new(40.0, -105.0)),
            NodeRecord::new(NodeId(2)).with_position(Location::new(40.1, -105.0)),
            NodeRecord::new(NodeId(3)),
        ]
        .into_iter()
        .collect();
        let observations = Observations {
            roster,
            messages: vec![MessageRecord {
                from: NodeId(1),
                to: Some(NodeId(2)),
                hops_away: Some(0),
                snr: Some(5.0),
                rssi: Some(-80),
                via_mqtt: false,
                timestamp_ms: 10,
            }],
            ..Default::default()
        };

        let report = NetworkReport::from_observations(&observations, 100);
        assert_eq!(report.generated_at_ms, 100);
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.graph.link_count(), 1);
        assert_eq!(report.summary.isolated, vec![NodeId(3)]);
        assert!(report.coverage.network_span_km > 10.0);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["graph"]["links"][0]["node_a"], "!00000001");
        assert_eq!(json["summary"]["isolated"][0], "!00000003");
        assert!(json["graph"]["links"][0].get("directions").is_none());
    }

    #[test]
    fn test_empty_analysis() {
        let report = analyze(&[], &AnalysisConfig::default(), 0);
        assert_eq!(report.graph.node_count(), 0);
        assert_eq!(report.coverage.total_area_km2, 0.0);
    }
}
