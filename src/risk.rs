//! Per-edge risk scoring.
//!
//! The passes run in a fixed order and each one finishes before the next
//! starts:
//!
//! 1. base risk from road class and length
//! 2. incident overlay
//! 3. time-of-day multiplier
//! 4. spatial propagation across adjacent edges
//! 5. node risk as the mean of incident edges
//!
//! Every pass clamps edge risk to `[0, 1]`. An element that cannot be scored
//! is logged and left as it was; it never aborts the pipeline.

use std::collections::HashMap;

use chrono::Timelike;
use lazy_static::lazy_static;
use petgraph::graph::EdgeIndex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ElementError, RouteError, RouteResult};
use crate::graph::{DEFAULT_LENGTH_M, DEFAULT_RISK, LabelSet, RoadEdge, RoadGraph};
use crate::incidents::{Incident, IncidentIndex};

/// Class assumed when an edge has no classification.
pub const FALLBACK_ROAD_CLASS: &str = "residential";

// Propagation blend: own risk vs. neighbour mean.
const SELF_WEIGHT: f64 = 0.7;
const NEIGHBOUR_WEIGHT: f64 = 0.3;
const CHANGE_THRESHOLD: f64 = 0.01;

lazy_static! {
    static ref ROAD_CLASS_RISK: HashMap<&'static str, f64> = HashMap::from([
        ("motorway", 0.15),
        ("trunk", 0.18),
        ("primary", 0.22),
        ("secondary", 0.28),
        ("tertiary", 0.35),
        ("residential", 0.55),
        ("living_street", 0.60),
        ("service", 0.75),
        ("unclassified", 0.70),
        ("track", 0.85),
        ("path", 0.95),
        ("footway", 0.90),
    ]);
}

pub fn clamp_risk(risk: f64) -> f64 {
    risk.clamp(0.0, 1.0)
}

/// Base risk of a road class; unknown classes are neutral.
pub fn base_risk_for(highway: Option<&LabelSet>) -> f64 {
    let class = highway.map_or(FALLBACK_ROAD_CLASS, LabelSet::as_str);
    ROAD_CLASS_RISK.get(class).copied().unwrap_or(DEFAULT_RISK)
}

/// Longer segments score up to 1.3x their base risk, reached at 500 m.
pub fn length_adjusted_risk(base_risk: f64, length_m: f64) -> f64 {
    let length_factor = (length_m / 500.0).min(1.0);
    (base_risk * (1.0 + 0.3 * length_factor)).min(1.0)
}

/// Risk multiplier for an hour of the day, `None` for hours past 23.
pub fn time_multiplier(hour: u32) -> Option<f64> {
    let multiplier = match hour {
        0..=4 => 2.0,   // late night
        5..=6 => 1.4,   // early morning
        7..=9 => 1.2,   // morning rush
        10..=15 => 0.8, // day time
        16..=18 => 1.3, // evening rush
        19..=21 => 1.6, // evening
        22..=23 => 1.8, // night
        _ => return None,
    };
    Some(multiplier)
}

#[derive(Debug, Clone)]
pub struct RiskSettings {
    /// Hour used by the time-of-day pass; the local clock when `None`.
    pub hour: Option<u32>,
    pub propagation_iterations: usize,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self { hour: None, propagation_iterations: 2 }
    }
}

/// What each pass did, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub base_scored: usize,
    pub incident_adjusted: usize,
    pub time_adjusted: usize,
    pub hour: u32,
    pub time_multiplier: f64,
    /// Edges that moved more than 0.01, per propagation iteration.
    pub propagation_changes: Vec<usize>,
    pub nodes_scored: usize,
    /// Elements any pass had to skip.
    pub skipped: usize,
}

pub struct RiskCalculator {
    settings: RiskSettings,
    incidents: IncidentIndex,
}

impl RiskCalculator {
    pub fn new(settings: RiskSettings, incidents: Vec<Incident>) -> Self {
        let incidents = IncidentIndex::new(incidents);
        info!("RiskCalculator initialized with {} incidents", incidents.len());
        Self { settings, incidents }
    }

    /// Run every pass in order.
    pub fn run(&self, graph: &mut RoadGraph) -> RouteResult<PipelineReport> {
        let hour = self.settings.hour.unwrap_or_else(|| chrono::Local::now().hour());
        let multiplier = time_multiplier(hour)
            .ok_or_else(|| RouteError::InvalidInput(format!("hour {hour} is outside 0..24")))?;

        let mut report = PipelineReport { hour, time_multiplier: multiplier, ..Default::default() };

        let (count, skipped) = self.assign_base_risk(graph);
        report.base_scored = count;
        report.skipped += skipped;

        let (count, skipped) = self.add_incident_risk(graph);
        report.incident_adjusted = count;
        report.skipped += skipped;

        let (count, skipped) = self.apply_time_factor(graph, multiplier);
        report.time_adjusted = count;
        report.skipped += skipped;

        let (changes, skipped) = self.propagate_risk(graph, self.settings.propagation_iterations);
        report.propagation_changes = changes;
        report.skipped += skipped;

        report.nodes_scored = self.calculate_node_risk(graph);
        Ok(report)
    }

    /// Pass 1. Returns `(scored, skipped)`.
    pub fn assign_base_risk(&self, graph: &mut RoadGraph) -> (usize, usize) {
        let (count, skipped) = update_edges(graph, |ix, _, edge| {
            let length = edge.length_m.unwrap_or(DEFAULT_LENGTH_M);
            if !length.is_finite() || length < 0.0 {
                return Err(ElementError::InvalidLength(ix, length));
            }
            let base = base_risk_for(edge.highway.as_ref());
            let risk = clamp_risk(length_adjusted_risk(base, length));
            Ok(Some(move |edge: &mut RoadEdge| {
                edge.base_risk = Some(base);
                edge.risk = Some(risk);
            }))
        });
        info!("Assigned base risk to {} edges", count);
        (count, skipped)
    }

    /// Pass 2. Raises the risk of edges whose midpoint lies near incidents.
    pub fn add_incident_risk(&self, graph: &mut RoadGraph) -> (usize, usize) {
        let incidents = &self.incidents;
        if incidents.is_empty() {
            info!("No incidents loaded, skipping overlay");
            return (0, 0);
        }
        let (count, skipped) = update_edges(graph, |ix, graph, edge| {
            let (u, v) = graph.endpoints(ix).ok_or(ElementError::MissingEndpoint(ix))?;
            let (Some(a), Some(b)) = (graph.node(u), graph.node(v)) else {
                return Err(ElementError::MissingEndpoint(ix));
            };
            for (node, node_ix) in [(a, u), (b, v)] {
                if !node.lat.is_finite() || !node.lon.is_finite() {
                    return Err(ElementError::InvalidCoordinates(node_ix));
                }
            }

            let mid_lat = (a.lat + b.lat) / 2.0;
            let mid_lon = (a.lon + b.lon) / 2.0;
            let additional = incidents.risk_at(mid_lat, mid_lon);
            if additional <= 0.0 {
                return Ok(None);
            }
            let risk = clamp_risk(edge.risk_or_default() + additional);
            Ok(Some(move |edge: &mut RoadEdge| edge.risk = Some(risk)))
        });
        info!("Added incident risk to {} edges", count);
        (count, skipped)
    }

    /// Pass 3. Scales every edge's risk, keeping the pre-scaling value.
    pub fn apply_time_factor(&self, graph: &mut RoadGraph, multiplier: f64) -> (usize, usize) {
        let (count, skipped) = update_edges(graph, |ix, _, edge| {
            let original = edge.risk_or_default();
            if !original.is_finite() {
                return Err(ElementError::InvalidRisk(ix, original));
            }
            let risk = clamp_risk(original * multiplier);
            Ok(Some(move |edge: &mut RoadEdge| {
                edge.risk = Some(risk);
                edge.original_risk = Some(original);
                edge.time_multiplier = Some(multiplier);
            }))
        });
        info!("Applied time factor {}x to {} edges", multiplier, count);
        (count, skipped)
    }

    /// Pass 4. Blends each edge with the mean of the other edges touching
    /// either endpoint. Updates within one iteration only see the previous
    /// iteration's values. Returns the per-iteration change counts and the
    /// number of skipped edge updates.
    pub fn propagate_risk(&self, graph: &mut RoadGraph, iterations: usize) -> (Vec<usize>, usize) {
        let edges: Vec<EdgeIndex> = graph.edge_indices().collect();
        let neighbours: Vec<Vec<EdgeIndex>> =
            edges.iter().map(|&ix| adjacent_edges(graph, ix)).collect();

        let mut changes = Vec::with_capacity(iterations);
        let mut skipped = 0;
        for iteration in 0..iterations {
            let current: HashMap<EdgeIndex, f64> = edges
                .iter()
                .map(|&ix| (ix, graph.edge(ix).map_or(DEFAULT_RISK, RoadEdge::risk_or_default)))
                .collect();

            let mut updates = Vec::with_capacity(edges.len());
            let mut changed = 0;
            for (&ix, adjacent) in edges.iter().zip(&neighbours) {
                if adjacent.is_empty() {
                    continue;
                }
                let risk = current[&ix];
                let neighbour_risks = adjacent.iter().map(|n| current[n]);
                match blended_risk(ix, risk, neighbour_risks) {
                    Ok(new_risk) => {
                        if (new_risk - risk).abs() > CHANGE_THRESHOLD {
                            changed += 1;
                        }
                        updates.push((ix, new_risk));
                    }
                    Err(e) => {
                        debug!("Skipping propagation: {}", e);
                        skipped += 1;
                    }
                }
            }

            for (ix, risk) in updates {
                if let Some(edge) = graph.edge_mut(ix) {
                    edge.risk = Some(risk);
                }
            }
            info!("  Iteration {}: updated {} edges", iteration + 1, changed);
            changes.push(changed);
        }
        (changes, skipped)
    }

    /// Pass 5. Nodes without edges get no risk.
    pub fn calculate_node_risk(&self, graph: &mut RoadGraph) -> usize {
        let nodes: Vec<_> = graph.node_indices().collect();
        let mut count = 0;
        for ix in nodes {
            let risks: Vec<f64> = graph
                .incident_edges(ix)
                .into_iter()
                .filter_map(|e| graph.edge(e).map(RoadEdge::risk_or_default))
                .collect();
            let risk = (!risks.is_empty()).then(|| risks.iter().sum::<f64>() / risks.len() as f64);
            if let Some(node) = graph.node_mut(ix) {
                node.risk = risk;
                count += usize::from(risk.is_some());
            }
        }
        info!("Calculated risk for {} nodes", count);
        count
    }
}

/// Distinct edges other than `ix` that touch either of its endpoints.
fn adjacent_edges(graph: &RoadGraph, ix: EdgeIndex) -> Vec<EdgeIndex> {
    let Some((u, v)) = graph.endpoints(ix) else {
        return Vec::new();
    };
    let mut adjacent = graph.incident_edges(u);
    adjacent.extend(graph.incident_edges(v));
    adjacent.sort_unstable();
    adjacent.dedup();
    adjacent.retain(|&e| e != ix);
    adjacent
}

fn blended_risk(
    ix: EdgeIndex,
    current: f64,
    neighbours: impl Iterator<Item = f64>,
) -> Result<f64, ElementError> {
    let (sum, count) = neighbours.fold((0.0, 0usize), |(s, c), r| (s + r, c + 1));
    let average = sum / count as f64;
    let blended = SELF_WEIGHT * current + NEIGHBOUR_WEIGHT * average;
    if blended.is_finite() {
        Ok(clamp_risk(blended))
    } else {
        Err(ElementError::InvalidRisk(ix, blended))
    }
}

/// Score every edge with `score`, then apply the returned updates.
///
/// `score` sees the graph as it was before the pass. `Ok(None)` leaves the
/// edge unchanged without counting it; `Err` skips it.
fn update_edges<F, U>(graph: &mut RoadGraph, mut score: F) -> (usize, usize)
where
    F: FnMut(EdgeIndex, &RoadGraph, &RoadEdge) -> Result<Option<U>, ElementError>,
    U: FnOnce(&mut RoadEdge),
{
    let view: &RoadGraph = graph;
    let mut updates = Vec::new();
    let mut skipped = 0;
    for ix in view.edge_indices() {
        let Some(edge) = view.edge(ix) else { continue };
        match score(ix, view, edge) {
            Ok(Some(update)) => updates.push((ix, update)),
            Ok(None) => {}
            Err(e) => {
                debug!("Skipping edge: {}", e);
                skipped += 1;
            }
        }
    }

    let count = updates.len();
    for (ix, update) in updates {
        if let Some(edge) = graph.edge_mut(ix) {
            update(edge);
        }
    }
    (count, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::NodeIndex;

    fn calculator(incidents: Vec<Incident>) -> RiskCalculator {
        RiskCalculator::new(RiskSettings { hour: Some(12), propagation_iterations: 2 }, incidents)
    }

    /// Path a - b - c - d with both directions, far from any incident.
    fn line_graph(risks: [f64; 3]) -> (RoadGraph, [NodeIndex; 4]) {
        let mut g = RoadGraph::new();
        let a = g.add_node(1, 0.0, 0.0);
        let b = g.add_node(2, 0.0, 0.001);
        let c = g.add_node(3, 0.0, 0.002);
        let d = g.add_node(4, 0.0, 0.003);
        for (&(u, v), risk) in [(a, b), (b, c), (c, d)].iter().zip(risks) {
            g.add_edge(u, v, RoadEdge::new(100.0).with_risk(risk));
            g.add_edge(v, u, RoadEdge::new(100.0).with_risk(risk));
        }
        (g, [a, b, c, d])
    }

    fn single_edge(edge: RoadEdge) -> (RoadGraph, EdgeIndex) {
        let mut g = RoadGraph::new();
        let a = g.add_node(1, 0.0, 0.0);
        let b = g.add_node(2, 0.0, 0.001);
        let ix = g.add_edge(a, b, edge);
        (g, ix)
    }

    #[test]
    fn road_class_table() {
        let motorway = LabelSet::single("motorway");
        let footway = LabelSet::single("footway");
        assert!(base_risk_for(Some(&motorway)) < base_risk_for(Some(&footway)));
        assert_eq!(base_risk_for(Some(&LabelSet::single("motorway_link"))), DEFAULT_RISK);
        assert_eq!(base_risk_for(None), 0.55);
    }

    #[test]
    fn first_listed_class_is_authoritative() {
        let labels = LabelSet::from_values(["footway", "motorway"]).unwrap();
        assert_eq!(base_risk_for(Some(&labels)), 0.90);
    }

    #[test]
    fn length_factor_is_capped() {
        let base = 0.5;
        let short = length_adjusted_risk(base, 100.0);
        let doubled = length_adjusted_risk(base, 200.0);
        assert!(doubled >= short);
        assert!((length_adjusted_risk(base, 500.0) - 0.65).abs() < 1e-12);
        assert_eq!(length_adjusted_risk(base, 5_000.0), length_adjusted_risk(base, 500.0));
        assert_eq!(length_adjusted_risk(0.95, 500.0), 1.0);
    }

    #[test]
    fn base_pass_scores_and_records_base() {
        let (mut g, ix) = single_edge(RoadEdge::new(250.0).with_highway("primary"));
        let (count, skipped) = calculator(vec![]).assign_base_risk(&mut g);
        assert_eq!((count, skipped), (1, 0));
        let edge = g.edge(ix).unwrap();
        assert_eq!(edge.base_risk, Some(0.22));
        assert!((edge.risk.unwrap() - 0.22 * 1.15).abs() < 1e-12);
    }

    #[test]
    fn base_pass_skips_negative_length() {
        let (mut g, ix) = single_edge(RoadEdge::new(-5.0).with_highway("primary"));
        let (count, skipped) = calculator(vec![]).assign_base_risk(&mut g);
        assert_eq!((count, skipped), (0, 1));
        assert_eq!(g.edge(ix).unwrap().risk, None);
    }

    #[test]
    fn missing_length_uses_default() {
        let (mut g, ix) = single_edge(RoadEdge::default().with_highway("motorway"));
        calculator(vec![]).assign_base_risk(&mut g);
        let expected = 0.15 * (1.0 + 0.3 * 0.2);
        assert!((g.edge(ix).unwrap().risk.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn incident_at_midpoint_adds_full_severity() {
        let (mut g, ix) = single_edge(RoadEdge::new(100.0).with_risk(0.1));
        let incident = Incident { lat: 0.0, lon: 0.0005, severity: 0.3, category: "x".into() };
        let (count, _) = calculator(vec![incident]).add_incident_risk(&mut g);
        assert_eq!(count, 1);
        assert!((g.edge(ix).unwrap().risk.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn incident_overlay_clamps_and_ignores_far_incidents() {
        let (mut g, ix) = single_edge(RoadEdge::new(100.0).with_risk(0.8));
        let near = Incident { lat: 0.0, lon: 0.0005, severity: 0.9, category: "x".into() };
        let far = Incident { lat: 0.01, lon: 0.0005, severity: 0.9, category: "x".into() };
        calculator(vec![near, far.clone()]).add_incident_risk(&mut g);
        assert_eq!(g.edge(ix).unwrap().risk, Some(1.0));

        let (mut g, ix) = single_edge(RoadEdge::new(100.0).with_risk(0.2));
        let (count, _) = calculator(vec![far]).add_incident_risk(&mut g);
        assert_eq!(count, 0);
        assert_eq!(g.edge(ix).unwrap().risk, Some(0.2));
    }

    #[test]
    fn incident_overlay_skips_bad_coordinates() {
        let mut g = RoadGraph::new();
        let a = g.add_node(1, f64::NAN, 0.0);
        let b = g.add_node(2, 0.0, 0.001);
        g.add_edge(a, b, RoadEdge::new(100.0).with_risk(0.2));
        let far = Incident { lat: 40.0, lon: 10.0, severity: 1.0, category: "theft".into() };
        let (count, skipped) = calculator(vec![far]).add_incident_risk(&mut g);
        assert_eq!((count, skipped), (0, 1));
    }

    #[test]
    fn no_incidents_leaves_risk_untouched() {
        let (mut g, ix) = single_edge(RoadEdge::new(100.0).with_risk(0.2));
        assert_eq!(calculator(vec![]).add_incident_risk(&mut g), (0, 0));
        assert_eq!(g.edge(ix).unwrap().risk, Some(0.2));
    }

    #[test]
    fn time_buckets() {
        assert_eq!(time_multiplier(3), Some(2.0));
        assert_eq!(time_multiplier(12), Some(0.8));
        assert_eq!(time_multiplier(23), Some(1.8));
        assert_eq!(time_multiplier(5), Some(1.4));
        assert_eq!(time_multiplier(7), Some(1.2));
        assert_eq!(time_multiplier(10), Some(0.8));
        assert_eq!(time_multiplier(16), Some(1.3));
        assert_eq!(time_multiplier(19), Some(1.6));
        assert_eq!(time_multiplier(22), Some(1.8));
        assert_eq!(time_multiplier(24), None);
    }

    #[test]
    fn time_factor_records_audit_fields() {
        let (mut g, ix) = single_edge(RoadEdge::new(100.0).with_risk(0.6));
        calculator(vec![]).apply_time_factor(&mut g, 2.0);
        let edge = g.edge(ix).unwrap();
        assert_eq!(edge.risk, Some(1.0));
        assert_eq!(edge.original_risk, Some(0.6));
        assert_eq!(edge.time_multiplier, Some(2.0));

        let (mut g, ix) = single_edge(RoadEdge::new(100.0));
        calculator(vec![]).apply_time_factor(&mut g, 0.8);
        assert_eq!(g.edge(ix).unwrap().original_risk, Some(DEFAULT_RISK));
        assert!((g.edge(ix).unwrap().risk.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn zero_iterations_leave_risk_unchanged() {
        let (mut g, _) = line_graph([0.1, 0.5, 0.9]);
        let before: Vec<_> = g.edge_indices().map(|e| g.edge(e).unwrap().risk).collect();
        let (changes, _) = calculator(vec![]).propagate_risk(&mut g, 0);
        assert!(changes.is_empty());
        let after: Vec<_> = g.edge_indices().map(|e| g.edge(e).unwrap().risk).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn propagation_is_synchronous() {
        // Edges: 0 a->b, 1 b->a, 2 b->c, 3 c->b, 4 c->d, 5 d->c.
        let (mut g, _) = line_graph([0.0, 0.0, 0.9]);
        let (changes, _) = calculator(vec![]).propagate_risk(&mut g, 1);

        // Edge 0 touches a and b: neighbours 1, 2, 3, all at 0.0.
        assert_eq!(g.edge(EdgeIndex::new(0)).unwrap().risk, Some(0.0));
        // Edge 2 touches b and c: neighbours 0, 1, 3, 4, 5 = (0+0+0+0.9+0.9)/5.
        let expected = 0.3 * (1.8 / 5.0);
        assert!((g.edge(EdgeIndex::new(2)).unwrap().risk.unwrap() - expected).abs() < 1e-12);
        // Edge 4 touches c and d: neighbours 2, 3, 5 = (0+0+0.9)/3, computed
        // from the pre-iteration value of edge 2.
        let expected = 0.7 * 0.9 + 0.3 * 0.3;
        assert!((g.edge(EdgeIndex::new(4)).unwrap().risk.unwrap() - expected).abs() < 1e-12);
        assert_eq!(changes, vec![4]);
    }

    #[test]
    fn propagation_converges_to_uniform_neighbourhood() {
        let (mut g, _) = line_graph([0.4, 0.4, 0.4]);
        let target = g.edge_indices().next().unwrap();
        g.edge_mut(target).unwrap().risk = Some(1.0);
        // Everything pulls toward a common value; with many rounds the
        // spread collapses.
        calculator(vec![]).propagate_risk(&mut g, 200);
        let risks: Vec<f64> = g.edge_indices().map(|e| g.edge(e).unwrap().risk.unwrap()).collect();
        let spread = risks.iter().cloned().fold(f64::MIN, f64::max)
            - risks.iter().cloned().fold(f64::MAX, f64::min);
        assert!(spread < 1e-6, "spread {spread}");

        let (mut uniform, _) = line_graph([0.3, 0.3, 0.3]);
        calculator(vec![]).propagate_risk(&mut uniform, 50);
        for e in uniform.edge_indices() {
            assert!((uniform.edge(e).unwrap().risk.unwrap() - 0.3).abs() < 1e-12);
        }
    }

    #[test]
    fn isolated_edge_has_no_neighbours() {
        let (mut g, ix) = single_edge(RoadEdge::new(100.0).with_risk(0.7));
        let (changes, _) = calculator(vec![]).propagate_risk(&mut g, 3);
        assert_eq!(changes, vec![0, 0, 0]);
        assert_eq!(g.edge(ix).unwrap().risk, Some(0.7));
    }

    #[test]
    fn node_risk_averages_both_directions() {
        let mut g = RoadGraph::new();
        let a = g.add_node(1, 0.0, 0.0);
        let b = g.add_node(2, 0.0, 0.001);
        let c = g.add_node(3, 0.0, 0.002);
        let lonely = g.add_node(4, 1.0, 1.0);
        g.add_edge(a, b, RoadEdge::new(10.0).with_risk(0.2));
        g.add_edge(c, b, RoadEdge::new(10.0).with_risk(0.6));
        g.add_edge(b, a, RoadEdge::new(10.0));

        let count = calculator(vec![]).calculate_node_risk(&mut g);
        assert_eq!(count, 3);
        let b_risk = g.node(b).unwrap().risk.unwrap();
        assert!((b_risk - (0.2 + 0.6 + 0.5) / 3.0).abs() < 1e-12);
        assert_eq!(g.node(lonely).unwrap().risk, None);
    }

    #[test]
    fn full_pipeline_keeps_risk_in_range() {
        let mut g = RoadGraph::new();
        let coords = [(11.0183, 76.9725), (11.0185, 76.9730), (11.0190, 76.9725), (11.0140, 76.9690)];
        let nodes: Vec<_> =
            coords.iter().enumerate().map(|(i, &(lat, lon))| g.add_node(i as i64, lat, lon)).collect();
        for (i, class) in ["footway", "motorway", "path", "service"].iter().enumerate() {
            let (u, v) = (nodes[i], nodes[(i + 1) % nodes.len()]);
            g.add_edge(u, v, RoadEdge::new(900.0).with_highway(class));
            g.add_edge(v, u, RoadEdge::new(900.0).with_highway(class));
        }

        let settings = RiskSettings { hour: Some(2), propagation_iterations: 2 };
        let report = RiskCalculator::new(settings, crate::incidents::default_incidents())
            .run(&mut g)
            .unwrap();

        assert_eq!(report.base_scored, 8);
        assert_eq!(report.time_multiplier, 2.0);
        assert_eq!(report.propagation_changes.len(), 2);
        assert_eq!(report.nodes_scored, 4);
        for e in g.edge_indices() {
            let risk = g.edge(e).unwrap().risk.unwrap();
            assert!((0.0..=1.0).contains(&risk));
        }
    }

    #[test]
    fn invalid_hour_is_rejected_before_mutation() {
        let (mut g, ix) = single_edge(RoadEdge::new(100.0));
        let calc = RiskCalculator::new(RiskSettings { hour: Some(30), propagation_iterations: 2 }, vec![]);
        assert!(matches!(calc.run(&mut g), Err(RouteError::InvalidInput(_))));
        assert_eq!(g.edge(ix).unwrap().risk, None);
    }
}
