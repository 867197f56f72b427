//! Risk-weighted shortest path search and route post-processing.

use std::str::FromStr;

use itertools::Itertools;
use petgraph::algo::astar;
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::graph::{RoadEdge, RoadGraph};

/// Assumed average speed for travel-time estimates.
pub const AVERAGE_SPEED_KMH: f64 = 40.0;

const UNNAMED_ROAD: &str = "Unnamed road";
const ARRIVAL: &str = "You have reached your destination";

/// Which of several parallel edges between two consecutive path nodes feeds
/// path statistics and instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParallelEdgePolicy {
    /// The first edge added between the pair.
    #[default]
    First,
    /// The edge with the lowest routing weight, ties to the first added.
    MinWeight,
}

impl FromStr for ParallelEdgePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "min-weight" => Ok(Self::MinWeight),
            other => Err(format!("unknown parallel edge policy '{other}' (expected first or min-weight)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInstruction {
    pub step: usize,
    pub instruction: String,
    pub road: String,
    /// Metres, rounded to whole metres.
    pub distance: f64,
}

/// Everything the presentation layer reports about a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub nodes: Vec<NodeIndex>,
    pub coordinates: Vec<Coordinate>,
    pub instructions: Vec<RouteInstruction>,
    pub risk: f64,
    pub distance_m: f64,
    pub distance_km: f64,
    pub time_min: f64,
}

pub struct PathFinder<'g> {
    graph: &'g RoadGraph,
    policy: ParallelEdgePolicy,
}

impl<'g> PathFinder<'g> {
    pub fn new(graph: &'g RoadGraph, policy: ParallelEdgePolicy) -> Self {
        Self { graph, policy }
    }

    /// Lowest-cost node sequence from `source` to `target` under
    /// [`RoadEdge::routing_weight`]. `None` when either node is absent or
    /// the target is unreachable.
    pub fn find_safest_route(&self, source: NodeIndex, target: NodeIndex) -> Option<Vec<NodeIndex>> {
        if !self.graph.contains_node(source) {
            debug!("Source node {:?} not in graph", source);
            return None;
        }
        if !self.graph.contains_node(target) {
            debug!("Target node {:?} not in graph", target);
            return None;
        }

        // Zero heuristic: plain Dijkstra that also returns the path.
        let result = astar(
            self.graph.inner(),
            source,
            |n| n == target,
            |e| e.weight().routing_weight(),
            |_| 0.0,
        );
        match result {
            Some((cost, path)) => {
                debug!("Path found with {} nodes, cost {:.1}", path.len(), cost);
                Some(path)
            }
            None => {
                info!("No path found between {:?} and {:?}", source, target);
                None
            }
        }
    }

    /// The edge between two consecutive path nodes used for statistics.
    pub fn edge_between(&self, from: NodeIndex, to: NodeIndex) -> Option<&'g RoadEdge> {
        let graph = self.graph;
        let candidates = graph.edges_between(from, to);
        let chosen: Option<EdgeIndex> = match self.policy {
            ParallelEdgePolicy::First => candidates.first().copied(),
            ParallelEdgePolicy::MinWeight => candidates.into_iter().min_by(|&a, &b| {
                let wa = graph.edge(a).map_or(f64::INFINITY, RoadEdge::routing_weight);
                let wb = graph.edge(b).map_or(f64::INFINITY, RoadEdge::routing_weight);
                wa.total_cmp(&wb).then(a.cmp(&b))
            }),
        };
        chosen.and_then(|ix| graph.edge(ix))
    }

    fn path_edges<'p>(&'p self, path: &'p [NodeIndex]) -> impl Iterator<Item = (usize, &'g RoadEdge)> + 'p {
        path.iter()
            .tuple_windows()
            .enumerate()
            .filter_map(|(i, (&u, &v))| self.edge_between(u, v).map(|edge| (i, edge)))
    }

    /// Mean edge risk along the path. Pairs without an edge, or edges
    /// without a risk, are left out; nothing to average gives 0.5.
    pub fn path_risk(&self, path: &[NodeIndex]) -> f64 {
        let risks: Vec<f64> = self.path_edges(path).filter_map(|(_, edge)| edge.risk).collect();
        if risks.is_empty() {
            return 0.5;
        }
        risks.iter().sum::<f64>() / risks.len() as f64
    }

    /// Total length in metres; edges without a length count as 100 m.
    pub fn path_distance(&self, path: &[NodeIndex]) -> f64 {
        self.path_edges(path).map(|(_, edge)| edge.length_or_default()).sum()
    }

    /// Coordinates of every path node the graph knows.
    pub fn path_to_coordinates(&self, path: &[NodeIndex]) -> Vec<Coordinate> {
        path.iter()
            .filter_map(|&ix| self.graph.node(ix))
            .map(|node| Coordinate { lat: node.lat, lon: node.lon })
            .collect()
    }

    /// One "Start on"/"Continue on" step per traversed edge, then an
    /// arrival step.
    pub fn route_instructions(&self, path: &[NodeIndex]) -> Vec<RouteInstruction> {
        let mut instructions: Vec<RouteInstruction> = self
            .path_edges(path)
            .map(|(i, edge)| {
                let road = edge.name.as_ref().map_or(UNNAMED_ROAD, |n| n.as_str()).to_string();
                let verb = if i == 0 { "Start" } else { "Continue" };
                RouteInstruction {
                    step: i + 1,
                    instruction: format!("{verb} on {road}"),
                    road,
                    distance: edge.valid_length().unwrap_or(0.0).round(),
                }
            })
            .collect();

        if !instructions.is_empty() {
            instructions.push(RouteInstruction {
                step: instructions.len() + 1,
                instruction: ARRIVAL.to_string(),
                road: String::new(),
                distance: 0.0,
            });
        }
        instructions
    }

    pub fn summarize(&self, path: Vec<NodeIndex>) -> RouteSummary {
        let distance_m = self.path_distance(&path);
        let distance_km = distance_m / 1000.0;
        RouteSummary {
            coordinates: self.path_to_coordinates(&path),
            instructions: self.route_instructions(&path),
            risk: self.path_risk(&path),
            distance_m,
            distance_km: round_to(distance_km, 2),
            time_min: round_to(distance_km / AVERAGE_SPEED_KMH * 60.0, 1),
            nodes: path,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
