//! Radio coverage estimation
//!
//! Estimates how much ground a mesh covers from node spacing, signal
//! quality, roles and altitude. The result is a heuristic with a
//! confidence score, not a propagation model.

use meshlens_core::{Location, NodeRole};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use crate::observations::{NodeRecord, NodeRoster};

/// SNR below which links are considered worse than fair
pub const FAIR_SNR_DB: f32 = -7.0;

const SNR_WINDOW_DB: (f32, f32) = (-15.0, 10.0);
const SNR_MULTIPLIER: (f64, f64) = (0.6, 1.4);
const ALTITUDE_FLOOR_M: f64 = 50.0;
const ALTITUDE_CEILING_M: f64 = 2000.0;
const ALTITUDE_MAX_BONUS: f64 = 0.5;
const MIN_OVERLAP_FACTOR: f64 = 0.3;

/// Radio environment, from most obstructed to most open
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    DenseUrban,
    Urban,
    Suburban,
    Rural,
    Open,
}

/// Expected per-node range in kilometers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeKm {
    pub min: f64,
    pub typical: f64,
    pub max: f64,
}

impl Environment {
    pub const ALL: [Environment; 5] = [
        Environment::DenseUrban,
        Environment::Urban,
        Environment::Suburban,
        Environment::Rural,
        Environment::Open,
    ];

    pub fn range(&self) -> RangeKm {
        let (min, typical, max) = match self {
            Environment::DenseUrban => (0.5, 1.0, 2.0),
            Environment::Urban => (1.0, 2.0, 5.0),
            Environment::Suburban => (2.0, 5.0, 10.0),
            Environment::Rural => (5.0, 10.0, 20.0),
            Environment::Open => (10.0, 20.0, 40.0),
        };
        RangeKm { min, typical, max }
    }

    /// Environment for an openness score
    pub fn from_score(score: f64) -> Self {
        if score <= -2.0 {
            Environment::DenseUrban
        } else if score <= -1.0 {
            Environment::Urban
        } else if score < 1.0 {
            Environment::Suburban
        } else if score < 2.0 {
            Environment::Rural
        } else {
            Environment::Open
        }
    }
}

/// Range multiplier for a device role
pub fn role_multiplier(role: Option<NodeRole>) -> f64 {
    match role {
        Some(NodeRole::Router) | Some(NodeRole::RouterLate) => 1.5,
        Some(NodeRole::Repeater) => 1.4,
        Some(NodeRole::RouterClient) => 1.3,
        Some(NodeRole::Tracker)
        | Some(NodeRole::TakTracker)
        | Some(NodeRole::Sensor)
        | Some(NodeRole::LostAndFound) => 0.7,
        _ => 1.0,
    }
}

/// Map SNR in dB linearly onto the multiplier window
pub fn snr_multiplier(snr: Option<f32>) -> f64 {
    let Some(snr) = snr.filter(|v| v.is_finite()) else {
        return 1.0;
    };
    let (lo, hi) = SNR_WINDOW_DB;
    let t = ((snr.clamp(lo, hi) - lo) / (hi - lo)) as f64;
    SNR_MULTIPLIER.0 + t * (SNR_MULTIPLIER.1 - SNR_MULTIPLIER.0)
}

/// Bonus for elevated antennas, meters above sea level
pub fn altitude_multiplier(altitude: Option<f64>) -> f64 {
    match altitude {
        Some(alt) if alt > ALTITUDE_FLOOR_M => {
            let t = ((alt - ALTITUDE_FLOOR_M) / (ALTITUDE_CEILING_M - ALTITUDE_FLOOR_M)).min(1.0);
            1.0 + t * ALTITUDE_MAX_BONUS
        }
        _ => 1.0,
    }
}

/// Inputs the estimate was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageAnalysis {
    pub avg_spacing_km: f64,
    pub avg_snr: Option<f32>,
    pub router_count: usize,
    pub mobile_count: usize,
    pub method: String,
}

/// Estimated coverage of one network snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageEstimate {
    pub environment: Environment,
    /// In `[0, 1]`
    pub confidence: f64,
    pub total_area_km2: f64,
    pub effective_radius_km: f64,
    pub network_span_km: f64,
    pub analysis: CoverageAnalysis,
    pub recommendations: Vec<String>,
}

fn is_mobile(role: Option<NodeRole>) -> bool {
    matches!(role, Some(NodeRole::Tracker) | Some(NodeRole::TakTracker))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Average distance from each positioned node to its nearest positioned peer
fn avg_nearest_spacing(points: &[Location]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    mean(points.iter().enumerate().map(|(i, p)| {
        points
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, q)| p.distance_km(q))
            .fold(f64::INFINITY, f64::min)
    }))
}

fn max_pairwise_distance(points: &[Location]) -> f64 {
    let mut span = 0.0f64;
    for (i, p) in points.iter().enumerate() {
        for q in &points[i + 1..] {
            span = span.max(p.distance_km(q));
        }
    }
    span
}

/// Bounding box of the points as (width, height) in kilometers
fn bounding_extent_km(points: &[Location]) -> (f64, f64) {
    let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_lon, mut max_lon) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lon = min_lon.min(p.longitude);
        max_lon = max_lon.max(p.longitude);
    }
    let mid_lat = (min_lat + max_lat) / 2.0;
    let mid_lon = (min_lon + max_lon) / 2.0;
    let width = Location::new(mid_lat, min_lon).distance_km(&Location::new(mid_lat, max_lon));
    let height = Location::new(min_lat, mid_lon).distance_km(&Location::new(max_lat, mid_lon));
    (width, height)
}

fn spacing_score(avg_spacing_km: Option<f64>) -> f64 {
    match avg_spacing_km {
        None => 0.0,
        Some(s) if s < 0.5 => -2.0,
        Some(s) if s < 1.5 => -1.0,
        Some(s) if s < 4.0 => 0.0,
        Some(s) if s < 10.0 => 1.0,
        Some(_) => 2.0,
    }
}

fn node_range_km(node: &NodeRecord, environment: Environment) -> f64 {
    environment.range().typical
        * role_multiplier(node.role)
        * snr_multiplier(node.snr)
        * altitude_multiplier(node.position.and_then(|p| p.altitude))
}

/// Estimate coverage for the nodes in a roster
///
/// Missing positions, SNR or roles lower the confidence but never fail the
/// estimate. An empty roster covers nothing.
pub fn estimate_coverage(roster: &NodeRoster) -> CoverageEstimate {
    let points: Vec<Location> = roster.positioned().map(|(_, loc)| *loc).collect();
    let node_count = roster.len();

    let avg_spacing = avg_nearest_spacing(&points);
    let avg_snr = mean(roster.iter().filter_map(|n| n.snr).map(f64::from)).map(|v| v as f32);
    let router_count = roster
        .iter()
        .filter(|n| n.role.map(|r| r.is_infrastructure()).unwrap_or(false))
        .count();
    let mobile_count = roster.iter().filter(|n| is_mobile(n.role)).count();
    let has_roles = roster.iter().any(|n| n.role.is_some());

    let analysis = CoverageAnalysis {
        avg_spacing_km: avg_spacing.unwrap_or(0.0),
        avg_snr,
        router_count,
        mobile_count,
        method: if avg_spacing.is_some() {
            "nearest_neighbor_spacing".to_string()
        } else {
            "role_defaults".to_string()
        },
    };

    if node_count == 0 {
        return CoverageEstimate {
            environment: Environment::Suburban,
            confidence: 0.0,
            total_area_km2: 0.0,
            effective_radius_km: 0.0,
            network_span_km: 0.0,
            analysis,
            recommendations: vec!["No nodes observed; coverage cannot be estimated".to_string()],
        };
    }

    let mut score = spacing_score(avg_spacing);
    match avg_snr {
        Some(snr) if snr < -5.0 => score -= 1.0,
        Some(snr) if snr > 5.0 => score += 1.0,
        _ => {}
    }
    if router_count as f64 / node_count as f64 >= 0.2 {
        score += 0.5;
    }
    let environment = Environment::from_score(score);

    let ranges: Vec<f64> = roster.iter().map(|n| node_range_km(n, environment)).collect();
    let avg_range = mean(ranges.iter().copied()).unwrap_or(0.0);
    let raw_area: f64 = ranges.iter().map(|r| PI * r * r).sum();

    let overlap = match avg_spacing {
        Some(spacing) if avg_range > 0.0 => {
            (spacing / (2.0 * avg_range)).clamp(MIN_OVERLAP_FACTOR, 1.0)
        }
        _ => 1.0,
    };
    let mut total_area = raw_area * overlap;
    if !points.is_empty() {
        let (width, height) = bounding_extent_km(&points);
        let cap = (width + 2.0 * avg_range) * (height + 2.0 * avg_range);
        total_area = total_area.min(cap);
    }

    let mut confidence = 0.3 + (0.1 * points.len() as f64).min(0.4);
    if avg_snr.is_some() {
        confidence += 0.15;
    }
    if has_roles {
        confidence += 0.1;
    }
    let confidence = confidence.min(0.95);

    let mut recommendations = Vec::new();
    if points.len() < 3 {
        recommendations.push(
            "Fewer than 3 nodes report a position; add positions to improve accuracy".to_string(),
        );
    }
    if let Some(spacing) = avg_spacing {
        if spacing > 1.5 * avg_range {
            recommendations.push(format!(
                "Average spacing of {spacing:.1} km exceeds node range; add relays to close gaps"
            ));
        }
    }
    if router_count == 0 && node_count > 3 {
        recommendations
            .push("No router or repeater nodes; a well-placed router would extend reach".to_string());
    }
    if let Some(snr) = avg_snr {
        if snr < FAIR_SNR_DB {
            recommendations.push(format!(
                "Average SNR of {snr:.1} dB is below fair; consider higher antennas"
            ));
        }
    }

    debug!(
        ?environment,
        nodes = node_count,
        positioned = points.len(),
        area_km2 = total_area,
        "Estimated coverage"
    );

    CoverageEstimate {
        environment,
        confidence,
        total_area_km2: total_area,
        effective_radius_km: avg_range,
        network_span_km: max_pairwise_distance(&points),
        analysis,
        recommendations,
    }
}
