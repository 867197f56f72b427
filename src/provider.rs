//! Road network acquisition from OpenStreetMap.
//!
//! Geocodes the place with Nominatim, then downloads every drivable way
//! within the radius from the Overpass API. Calls block; run them on the
//! blocking pool.

use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use tracing::{debug, info};

use crate::graph::{DRIVABLE_HIGHWAYS, RoadGraph, RoadGraphBuilder, WayTags};

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

const USER_AGENT: &str = concat!("safe-route/", env!("CARGO_PKG_VERSION"));

/// Yields a road network for a place name and a radius around it.
pub trait GraphProvider: Send + Sync {
    fn fetch(&self, place: &str, radius_m: f64) -> anyhow::Result<RoadGraph>;
}

#[derive(Debug, Clone)]
pub struct OverpassConfig {
    pub nominatim_url: String,
    pub overpass_url: String,
    pub timeout: Duration,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            timeout: Duration::from_secs(180),
        }
    }
}

pub struct OverpassProvider {
    config: OverpassConfig,
    agent: ureq::Agent,
}

impl OverpassProvider {
    pub fn new(config: OverpassConfig) -> Self {
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout))
            .build()
            .new_agent();
        Self { config, agent }
    }

    /// `(lat, lon)` of the best geocoding match.
    pub fn geocode(&self, place: &str) -> anyhow::Result<(f64, f64)> {
        let response = self
            .agent
            .get(&self.config.nominatim_url)
            .header("User-Agent", USER_AGENT)
            .query("q", place)
            .query("format", "json")
            .query("limit", "1")
            .call()
            .context("geocoding request failed")?;

        let status = response.status().as_u16();
        if status >= 400 {
            bail!("geocoder returned status {}", status);
        }

        let hits: Vec<GeocodeHit> = response.into_body().read_json().context("invalid geocoder response")?;
        let hit = hits.first().with_context(|| format!("no geocoding result for '{place}'"))?;
        let lat: f64 = hit.lat.parse().context("geocoder returned a bad latitude")?;
        let lon: f64 = hit.lon.parse().context("geocoder returned a bad longitude")?;
        debug!("Geocoded '{}' to ({:.5}, {:.5})", place, lat, lon);
        Ok((lat, lon))
    }

    fn download(&self, lat: f64, lon: f64, radius_m: f64) -> anyhow::Result<OverpassResponse> {
        let query = overpass_query(lat, lon, radius_m);
        debug!("Overpass query:\n{}", query);
        info!("Sending request to Overpass API...");

        let response = self
            .agent
            .post(&self.config.overpass_url)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "text/plain")
            .send(query.as_str())
            .context("Overpass request failed")?;

        let status = response.status().as_u16();
        if status >= 400 {
            bail!("Overpass API returned status {}", status);
        }
        response.into_body().read_json().context("invalid Overpass response")
    }
}

impl GraphProvider for OverpassProvider {
    fn fetch(&self, place: &str, radius_m: f64) -> anyhow::Result<RoadGraph> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            bail!("radius must be a positive number of metres, got {}", radius_m);
        }
        info!("Downloading {} with radius {}m...", place, radius_m);
        let (lat, lon) = self.geocode(place)?;
        let osm = self.download(lat, lon, radius_m)?;
        info!("Downloaded {} OSM elements", osm.elements.len());
        Ok(build_from_osm(&osm))
    }
}

fn overpass_query(lat: f64, lon: f64, radius_m: f64) -> String {
    let classes = DRIVABLE_HIGHWAYS.join("|");
    format!(
        r#"[out:json][timeout:180];
(
  way["highway"~"^({classes})$"]
    (around:{radius_m},{lat},{lon});
);
(._;>;);
out body;"#
    )
}

fn build_from_osm(osm: &OverpassResponse) -> RoadGraph {
    let mut builder = RoadGraphBuilder::new();

    // Nodes first: ways reference them.
    for elem in &osm.elements {
        if let ("node", Some(lat), Some(lon)) = (elem.elem_type.as_str(), elem.lat, elem.lon) {
            builder.add_coordinate(elem.id, lat, lon);
        }
    }

    let empty = WayTags::default();
    for elem in &osm.elements {
        if let ("way", Some(refs)) = (elem.elem_type.as_str(), elem.nodes.as_ref()) {
            builder.add_way(refs, elem.tags.as_ref().unwrap_or(&empty));
        }
    }
    builder.build()
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OsmElement>,
}

#[derive(Debug, Deserialize)]
struct OsmElement {
    #[serde(rename = "type")]
    elem_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    nodes: Option<Vec<i64>>,
    tags: Option<WayTags>,
}
