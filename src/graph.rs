use std::collections::HashMap;
use std::path::Path;

use geo::prelude::*;
use geo::Point;
use osmpbf::{Element, ElementReader};
use petgraph::graph::{EdgeIndex, Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::StoreError;

/// Length assumed for an edge that carries none.
pub const DEFAULT_LENGTH_M: f64 = 100.0;
/// Risk assumed for an edge that carries none.
pub const DEFAULT_RISK: f64 = 0.5;

/// A classification or name that the source data may give as one value or a
/// list. The first value is authoritative; the rest are kept as alternates.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    pub primary: String,
    pub alternates: Vec<String>,
}

impl LabelSet {
    pub fn single(value: impl Into<String>) -> Self {
        Self { primary: value.into(), alternates: Vec::new() }
    }

    /// `None` for an empty list.
    pub fn from_values<I, S>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = values.into_iter().map(Into::into);
        let primary = iter.next()?;
        Some(Self { primary, alternates: iter.collect() })
    }

    /// Parse an OSM tag value, where `;` separates multiple values.
    pub fn from_tag(value: &str) -> Option<Self> {
        Self::from_values(value.split(';').map(str::trim).filter(|v| !v.is_empty()))
    }

    pub fn as_str(&self) -> &str {
        &self.primary
    }
}

impl Serialize for LabelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.alternates.is_empty() {
            serializer.serialize_str(&self.primary)
        } else {
            let all: Vec<&str> = std::iter::once(self.primary.as_str())
                .chain(self.alternates.iter().map(String::as_str))
                .collect();
            all.serialize(serializer)
        }
    }
}

fn deserialize_labels<'de, D>(deserializer: D) -> Result<Option<LabelSet>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::One(value)) => Some(LabelSet::single(value)),
        Some(Raw::Many(values)) => LabelSet::from_values(values),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadNode {
    pub osm_id: i64,
    pub lat: f64,
    pub lon: f64,
    /// Mean risk of incident edges, derived after all edge passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_m: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_labels", skip_serializing_if = "Option::is_none")]
    pub highway: Option<LabelSet>,
    #[serde(default, deserialize_with = "deserialize_labels", skip_serializing_if = "Option::is_none")]
    pub name: Option<LabelSet>,
    #[serde(default)]
    pub oneway: bool,

    // Derived by the risk pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_risk: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_risk: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_multiplier: Option<f64>,
}

impl RoadEdge {
    pub fn new(length_m: f64) -> Self {
        Self { length_m: Some(length_m), ..Self::default() }
    }

    pub fn with_highway(mut self, highway: &str) -> Self {
        self.highway = Some(LabelSet::single(highway));
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(LabelSet::single(name));
        self
    }

    pub fn with_risk(mut self, risk: f64) -> Self {
        self.risk = Some(risk);
        self
    }

    /// The recorded length, if it is a usable distance.
    pub fn valid_length(&self) -> Option<f64> {
        self.length_m.filter(|l| l.is_finite() && *l >= 0.0)
    }

    pub fn length_or_default(&self) -> f64 {
        self.valid_length().unwrap_or(DEFAULT_LENGTH_M)
    }

    pub fn risk_or_default(&self) -> f64 {
        self.risk.unwrap_or(DEFAULT_RISK)
    }

    /// Search cost: risk dominates distance by three orders of magnitude.
    pub fn routing_weight(&self) -> f64 {
        self.risk_or_default() * 1000.0 + self.length_or_default() * 0.1
    }

    /// Copy of the edge with every pipeline-derived field cleared.
    pub fn raw(&self) -> Self {
        Self {
            length_m: self.length_m,
            highway: self.highway.clone(),
            name: self.name.clone(),
            oneway: self.oneway,
            ..Self::default()
        }
    }
}

/// Directed road multigraph. Parallel edges between the same ordered node
/// pair are distinct `EdgeIndex` values.
#[derive(Debug, Clone, Default)]
pub struct RoadGraph {
    graph: Graph<RoadNode, RoadEdge>,
    osm_index: HashMap<i64, NodeIndex>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or return the existing one with the same OSM id.
    pub fn add_node(&mut self, osm_id: i64, lat: f64, lon: f64) -> NodeIndex {
        let graph = &mut self.graph;
        *self
            .osm_index
            .entry(osm_id)
            .or_insert_with(|| graph.add_node(RoadNode { osm_id, lat, lon, risk: None }))
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: RoadEdge) -> EdgeIndex {
        self.graph.add_edge(from, to, edge)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_node(&self, node: NodeIndex) -> bool {
        node.index() < self.graph.node_count()
    }

    pub fn node(&self, node: NodeIndex) -> Option<&RoadNode> {
        self.graph.node_weight(node)
    }

    pub fn node_mut(&mut self, node: NodeIndex) -> Option<&mut RoadNode> {
        self.graph.node_weight_mut(node)
    }

    pub fn node_by_osm_id(&self, osm_id: i64) -> Option<NodeIndex> {
        self.osm_index.get(&osm_id).copied()
    }

    pub fn edge(&self, edge: EdgeIndex) -> Option<&RoadEdge> {
        self.graph.edge_weight(edge)
    }

    pub fn edge_mut(&mut self, edge: EdgeIndex) -> Option<&mut RoadEdge> {
        self.graph.edge_weight_mut(edge)
    }

    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn edge_indices(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    /// All parallel edges `from -> to`, in insertion order.
    pub fn edges_between(&self, from: NodeIndex, to: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> =
            self.graph.edges_connecting(from, to).map(|e| e.id()).collect();
        edges.sort_unstable();
        edges
    }

    /// Edges leaving or entering `node`, each listed once, in insertion order.
    pub fn incident_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .chain(self.graph.edges_directed(node, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Underlying petgraph, for search algorithms.
    pub fn inner(&self) -> &Graph<RoadNode, RoadEdge> {
        &self.graph
    }
}

// --- OSM ingestion ---

/// The way tags the builder cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WayTags {
    pub highway: Option<String>,
    pub name: Option<String>,
    pub oneway: Option<String>,
}

impl WayTags {
    fn from_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Self {
        let mut tags = Self::default();
        for (key, value) in pairs {
            match key {
                "highway" => tags.highway = Some(value.to_string()),
                "name" => tags.name = Some(value.to_string()),
                "oneway" => tags.oneway = Some(value.to_string()),
                _ => {}
            }
        }
        tags
    }
}

/// Road classes that make up a drivable network.
pub const DRIVABLE_HIGHWAYS: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "residential",
    "living_street",
    "service",
    "unclassified",
];

pub fn is_drivable(highway: &str) -> bool {
    DRIVABLE_HIGHWAYS.contains(&highway)
}

/// Builds a [`RoadGraph`] from OSM node coordinates and ways.
///
/// Coordinates must be registered before the ways that reference them.
#[derive(Default)]
pub struct RoadGraphBuilder {
    coordinates: HashMap<i64, (f64, f64)>,
    graph: RoadGraph,
    ways: usize,
}

impl RoadGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_coordinate(&mut self, osm_id: i64, lat: f64, lon: f64) {
        self.coordinates.insert(osm_id, (lat, lon));
    }

    pub fn coordinate_count(&self) -> usize {
        self.coordinates.len()
    }

    /// Add every consecutive segment of a drivable way. Segments whose nodes
    /// have no known coordinates are dropped.
    pub fn add_way(&mut self, refs: &[i64], tags: &WayTags) {
        let Some(highway) = tags.highway.as_deref().filter(|h| is_drivable(h)) else {
            return;
        };

        let (forward, backward) = match tags.oneway.as_deref() {
            Some("yes" | "1" | "true") => (true, false),
            Some("-1") => (false, true),
            _ => (true, true),
        };
        let oneway = forward != backward;

        for window in refs.windows(2) {
            let (id_a, id_b) = (window[0], window[1]);
            let (Some(&(lat_a, lon_a)), Some(&(lat_b, lon_b))) =
                (self.coordinates.get(&id_a), self.coordinates.get(&id_b))
            else {
                continue;
            };

            let idx_a = self.graph.add_node(id_a, lat_a, lon_a);
            let idx_b = self.graph.add_node(id_b, lat_b, lon_b);

            let p1 = Point::new(lon_a, lat_a);
            let p2 = Point::new(lon_b, lat_b);
            let edge = RoadEdge {
                length_m: Some(p1.haversine_distance(&p2)),
                highway: LabelSet::from_tag(highway),
                name: tags.name.as_deref().and_then(LabelSet::from_tag),
                oneway,
                ..RoadEdge::default()
            };

            if forward {
                self.graph.add_edge(idx_a, idx_b, edge.clone());
            }
            if backward {
                self.graph.add_edge(idx_b, idx_a, edge);
            }
        }
        self.ways += 1;
    }

    pub fn build(self) -> RoadGraph {
        info!(
            "Graph built: {} nodes, {} edges from {} ways",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.ways
        );
        self.graph
    }
}

/// Import the drivable network of a local `.osm.pbf` extract.
pub fn import_pbf(path: &Path) -> Result<RoadGraph, StoreError> {
    info!("Parsing OSM PBF: {}", path.display());
    let pbf_err = |e: osmpbf::Error| StoreError::Pbf(e.to_string());

    let mut builder = RoadGraphBuilder::new();

    // PASS 1: Nodes
    let reader = ElementReader::from_path(path).map_err(pbf_err)?;
    reader
        .for_each(|element| match element {
            Element::Node(node) => builder.add_coordinate(node.id(), node.lat(), node.lon()),
            Element::DenseNode(node) => builder.add_coordinate(node.id(), node.lat(), node.lon()),
            _ => {}
        })
        .map_err(pbf_err)?;

    debug!("Loaded {} coordinates. Building edges...", builder.coordinate_count());

    // PASS 2: Ways
    let reader = ElementReader::from_path(path).map_err(pbf_err)?;
    reader
        .for_each(|element| {
            if let Element::Way(way) = element {
                let tags = WayTags::from_pairs(way.tags());
                let refs: Vec<i64> = way.refs().collect();
                builder.add_way(&refs, &tags);
            }
        })
        .map_err(pbf_err)?;

    Ok(builder.build())
}
