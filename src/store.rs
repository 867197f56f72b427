//! On-disk graph store: one JSON blob per location key, plus a metadata
//! sidecar. Raw `.osm.pbf` extracts dropped into the same directory are
//! listed and imported too.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;
use crate::graph::{self, RoadEdge, RoadGraph, RoadNode};

/// Stored format version. Bump when `StoredGraph` changes shape.
const STORE_VERSION: u32 = 1;

const GRAPH_SUFFIX: &str = ".graph.json";
const META_SUFFIX: &str = ".meta.json";
const PBF_SUFFIX: &str = ".osm.pbf";

const MAX_KEY_CHARS: usize = 50;

/// Storage key for a human-readable place name: lowercased, commas
/// stripped, spaces turned into underscores, at most 50 characters.
pub fn location_key(name: &str) -> String {
    name.to_lowercase()
        .replace(',', "")
        .replace(' ', "_")
        .chars()
        .take(MAX_KEY_CHARS)
        .collect()
}

fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMetadata {
    pub location: String,
    pub nodes: usize,
    pub edges: usize,
    pub download_time: DateTime<Utc>,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedLocation {
    pub id: String,
    pub name: String,
    pub file: String,
}

#[derive(Serialize, Deserialize)]
struct StoredGraph {
    version: u32,
    nodes: Vec<RoadNode>,
    edges: Vec<StoredEdge>,
}

#[derive(Serialize, Deserialize)]
struct StoredEdge {
    from: usize,
    to: usize,
    edge: RoadEdge,
}

pub struct GraphStore {
    dir: PathBuf,
}

impl GraphStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn graph_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.dir.join(format!("{}{GRAPH_SUFFIX}", checked_key(key)?)))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.dir.join(format!("{}{META_SUFFIX}", checked_key(key)?)))
    }

    fn pbf_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.dir.join(format!("{}{PBF_SUFFIX}", checked_key(key)?)))
    }

    /// Key for a stored file reference: a bare key, a file name or a path
    /// inside the store. Only the file name is used.
    pub fn resolve_key(file: &str) -> String {
        let name = Path::new(file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file);
        [GRAPH_SUFFIX, PBF_SUFFIX]
            .iter()
            .find_map(|suffix| name.strip_suffix(suffix))
            .unwrap_or(name)
            .to_string()
    }

    /// Persist the raw graph (derived risk fields are dropped) and its
    /// metadata.
    pub fn save(&self, key: &str, graph: &RoadGraph, metadata: &LocationMetadata) -> Result<(), StoreError> {
        let path = self.graph_path(key)?;
        let meta_path = self.meta_path(key)?;
        std::fs::create_dir_all(&self.dir)?;

        let nodes = graph
            .node_indices()
            .filter_map(|ix| graph.node(ix))
            .map(|node| RoadNode { risk: None, ..node.clone() })
            .collect();
        let edges = graph
            .edge_indices()
            .filter_map(|ix| {
                let (from, to) = graph.endpoints(ix)?;
                let edge = graph.edge(ix)?.raw();
                Some(StoredEdge { from: from.index(), to: to.index(), edge })
            })
            .collect();
        let stored = StoredGraph { version: STORE_VERSION, nodes, edges };

        std::fs::write(&path, serde_json::to_vec(&stored)?)?;
        std::fs::write(meta_path, serde_json::to_vec_pretty(metadata)?)?;
        info!("Graph saved to {}", path.display());
        Ok(())
    }

    /// Load a saved graph, falling back to a `.osm.pbf` extract with the
    /// same key.
    pub fn load(&self, key: &str) -> Result<RoadGraph, StoreError> {
        let path = self.graph_path(key)?;
        if path.is_file() {
            let data = std::fs::read(&path)?;
            let stored: StoredGraph = serde_json::from_slice(&data)?;
            return rebuild(stored);
        }

        let pbf = self.pbf_path(key)?;
        if pbf.is_file() {
            return graph::import_pbf(&pbf);
        }
        Err(StoreError::UnknownLocation(key.to_string()))
    }

    pub fn metadata(&self, key: &str) -> Option<LocationMetadata> {
        let data = std::fs::read(self.meta_path(key).ok()?).ok()?;
        serde_json::from_slice(&data).ok()
    }

    /// Every loadable location, sorted by key.
    pub fn list(&self) -> Result<Vec<SavedLocation>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut locations: Vec<SavedLocation> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = [GRAPH_SUFFIX, PBF_SUFFIX]
                .iter()
                .find_map(|suffix| file_name.strip_suffix(suffix))
            else {
                continue;
            };
            locations.push(SavedLocation {
                id: key.to_string(),
                name: title_case(key),
                file: path.display().to_string(),
            });
        }

        // A saved graph shadows a PBF extract of the same key.
        locations.sort_by(|a, b| {
            a.id.cmp(&b.id).then_with(|| b.file.ends_with(GRAPH_SUFFIX).cmp(&a.file.ends_with(GRAPH_SUFFIX)))
        });
        locations.dedup_by(|later, first| later.id == first.id);
        Ok(locations)
    }
}

/// Keys name a file directly inside the store: no separators, no parent
/// references.
pub fn checked_key(key: &str) -> Result<&str, StoreError> {
    if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

fn rebuild(stored: StoredGraph) -> Result<RoadGraph, StoreError> {
    if stored.version != STORE_VERSION {
        return Err(StoreError::Version { found: stored.version, expected: STORE_VERSION });
    }

    let mut graph = RoadGraph::new();
    let indices: Vec<_> = stored
        .nodes
        .iter()
        .map(|node| graph.add_node(node.osm_id, node.lat, node.lon))
        .collect();

    for stored_edge in stored.edges {
        let (Some(&from), Some(&to)) = (indices.get(stored_edge.from), indices.get(stored_edge.to)) else {
            return Err(StoreError::Corrupt(format!(
                "edge {} -> {} references a missing node",
                stored_edge.from, stored_edge.to
            )));
        };
        if let Some(length) = stored_edge.edge.length_m.filter(|l| !l.is_finite() || *l < 0.0) {
            return Err(StoreError::Corrupt(format!(
                "edge {} -> {} has an invalid length {}",
                stored_edge.from, stored_edge.to, length
            )));
        }
        graph.add_edge(from, to, stored_edge.edge);
    }
    Ok(graph)
}
