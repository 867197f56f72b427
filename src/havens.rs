use std::path::Path;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;
use crate::spatial::NodeLocator;

/// A point of refuge, snapped to the road network it was registered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeHaven {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "type")]
    pub category: String,
    /// Resolved at registration; stale once the graph changes.
    #[serde(default)]
    pub nearest_node: Option<NodeIndex>,
}

impl SafeHaven {
    fn new(name: &str, lat: f64, lon: f64, category: &str) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lon,
            category: category.to_string(),
            nearest_node: None,
        }
    }
}

/// Built-in havens for Coimbatore.
pub fn default_havens() -> Vec<SafeHaven> {
    vec![
        SafeHaven::new("Gandhipuram Police Station", 11.0183, 76.9725, "police"),
        SafeHaven::new("RS Puram Police Station", 11.0259, 76.9795, "police"),
        SafeHaven::new("City Hospital", 11.0149, 76.9934, "hospital"),
        SafeHaven::new("Government Hospital", 11.0054, 76.9611, "hospital"),
        SafeHaven::new("Race Course Police Station", 11.0168, 76.9618, "police"),
        SafeHaven::new("Saibaba Colony Police Station", 11.0220, 76.9820, "police"),
    ]
}

/// Havens from `path` if it exists, otherwise the built-in set.
pub fn load_or_default(path: &Path) -> Result<Vec<SafeHaven>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(data) => Ok(serde_json::from_str(&data)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default_havens()),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SafeHavenRegistry {
    havens: Vec<SafeHaven>,
}

impl SafeHavenRegistry {
    /// Bind every haven to its nearest node.
    pub fn register(havens: Vec<SafeHaven>, locator: &NodeLocator) -> Self {
        let havens: Vec<SafeHaven> = havens
            .into_iter()
            .map(|haven| SafeHaven { nearest_node: locator.nearest(haven.lat, haven.lon), ..haven })
            .collect();
        info!("Registered {} safe havens", havens.len());
        Self { havens }
    }

    pub fn havens(&self) -> &[SafeHaven] {
        &self.havens
    }

    pub fn len(&self) -> usize {
        self.havens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.havens.is_empty()
    }
}
