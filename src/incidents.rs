use std::collections::HashMap;
use std::path::Path;

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::spatial::equirectangular_m;

/// Incidents further than this from an edge midpoint have no effect.
pub const INCIDENT_RADIUS_M: f64 = 500.0;

// Resolution 8 cells have an inradius of at least ~250 m, so a 2-ring disk
// around the query cell covers every point within 500 m.
const INDEX_RESOLUTION: Resolution = Resolution::Eight;
const INDEX_RINGS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub lat: f64,
    pub lon: f64,
    /// 0.0 = harmless, 1.0 = severe
    pub severity: f64,
    #[serde(rename = "type")]
    pub category: String,
}

impl Incident {
    fn new(lat: f64, lon: f64, severity: f64, category: &str) -> Self {
        Self { lat, lon, severity, category: category.to_string() }
    }

    /// Risk this incident adds at `distance_m`, linear falloff to zero at
    /// [`INCIDENT_RADIUS_M`].
    pub fn contribution(&self, distance_m: f64) -> f64 {
        if distance_m < INCIDENT_RADIUS_M {
            self.severity * (1.0 - distance_m / INCIDENT_RADIUS_M)
        } else {
            0.0
        }
    }
}

/// Built-in incident set for Coimbatore.
pub fn default_incidents() -> Vec<Incident> {
    vec![
        Incident::new(11.0183, 76.9725, 0.95, "accident_hotspot"),
        Incident::new(11.0168, 76.9750, 0.85, "theft_prone"),
        Incident::new(11.0145, 76.9690, 0.80, "accident"),
        Incident::new(11.0054, 76.9611, 0.75, "snatching"),
        Incident::new(11.0259, 76.9795, 0.60, "accident"),
        Incident::new(11.0220, 76.9820, 0.55, "theft"),
        Incident::new(11.0149, 76.9934, 0.50, "accident"),
        Incident::new(11.0350, 76.9980, 0.45, "snatching"),
        Incident::new(11.0400, 76.9600, 0.25, "minor"),
    ]
}

/// Read incidents from `path`. A missing file is regenerated from the
/// built-in set; writing it back is best-effort.
pub fn load_or_generate(path: &Path) -> Result<Vec<Incident>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(data) => {
            let incidents: Vec<Incident> = serde_json::from_str(&data)?;
            info!("Loaded {} incidents from {}", incidents.len(), path.display());
            Ok(incidents)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let incidents = default_incidents();
            if let Err(e) = write_incidents(path, &incidents) {
                warn!("Could not save generated incidents to {}: {}", path.display(), e);
            }
            info!("Created {} sample incidents", incidents.len());
            Ok(incidents)
        }
        Err(e) => Err(e.into()),
    }
}

fn write_incidents(path: &Path, incidents: &[Incident]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(incidents)?)?;
    Ok(())
}

/// Incidents bucketed by H3 cell for radius queries.
pub struct IncidentIndex {
    incidents: Vec<Incident>,
    cells: HashMap<CellIndex, Vec<usize>>,
    // Incidents whose coordinates H3 rejects; always checked.
    unindexed: Vec<usize>,
}

impl IncidentIndex {
    pub fn new(incidents: Vec<Incident>) -> Self {
        let mut cells: HashMap<CellIndex, Vec<usize>> = HashMap::new();
        let mut unindexed = Vec::new();
        for (i, incident) in incidents.iter().enumerate() {
            match LatLng::new(incident.lat, incident.lon) {
                Ok(ll) => cells.entry(ll.to_cell(INDEX_RESOLUTION)).or_default().push(i),
                Err(_) => unindexed.push(i),
            }
        }
        Self { incidents, cells, unindexed }
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Summed contribution of every incident within range of `(lat, lon)`,
    /// with distances projected around `lat`. Summation follows incident
    /// order so the result equals a brute-force scan.
    pub fn risk_at(&self, lat: f64, lon: f64) -> f64 {
        let mut candidates: Vec<usize> = match LatLng::new(lat, lon) {
            Ok(ll) => ll
                .to_cell(INDEX_RESOLUTION)
                .grid_disk::<Vec<_>>(INDEX_RINGS)
                .iter()
                .filter_map(|cell| self.cells.get(cell))
                .flatten()
                .copied()
                .chain(self.unindexed.iter().copied())
                .collect(),
            Err(_) => (0..self.incidents.len()).collect(),
        };
        candidates.sort_unstable();
        candidates.dedup();

        candidates
            .into_iter()
            .map(|i| {
                let incident = &self.incidents[i];
                incident.contribution(equirectangular_m(lat, lat, lon, incident.lat, incident.lon))
            })
            .sum()
    }
}
