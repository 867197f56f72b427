use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::path::ParallelEdgePolicy;
use crate::provider::{DEFAULT_NOMINATIM_URL, DEFAULT_OVERPASS_URL, OverpassConfig};
use crate::risk::RiskSettings;

/// Safety-weighted routing server.
#[derive(Parser, Debug, Clone)]
#[command(name = "safe-route", version, about)]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "SAFE_ROUTE_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// Directory holding saved graphs, incidents.json and safe_havens.json
    #[arg(long, env = "SAFE_ROUTE_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Hour of day (0-23) for the time-of-day risk factor (default: local clock)
    #[arg(long, env = "SAFE_ROUTE_HOUR", value_parser = clap::value_parser!(u32).range(0..24))]
    pub hour: Option<u32>,

    /// Number of risk propagation iterations
    #[arg(long, env = "SAFE_ROUTE_PROPAGATION_ITERATIONS", default_value = "2")]
    pub propagation_iterations: usize,

    /// Edge chosen between nodes joined by parallel edges: first, min-weight
    #[arg(long, env = "SAFE_ROUTE_PARALLEL_EDGES", default_value = "first")]
    pub parallel_edges: ParallelEdgePolicy,

    /// Nominatim search endpoint
    #[arg(long, env = "SAFE_ROUTE_NOMINATIM_URL", default_value = DEFAULT_NOMINATIM_URL)]
    pub nominatim_url: String,

    /// Overpass interpreter endpoint
    #[arg(long, env = "SAFE_ROUTE_OVERPASS_URL", default_value = DEFAULT_OVERPASS_URL)]
    pub overpass_url: String,

    /// Timeout for a whole provider request, in seconds
    #[arg(long, env = "SAFE_ROUTE_PROVIDER_TIMEOUT_SECS", default_value = "180")]
    pub provider_timeout_secs: u64,
}

impl Config {
    pub fn risk_settings(&self) -> RiskSettings {
        RiskSettings { hour: self.hour, propagation_iterations: self.propagation_iterations }
    }

    pub fn overpass_config(&self) -> OverpassConfig {
        OverpassConfig {
            nominatim_url: self.nominatim_url.clone(),
            overpass_url: self.overpass_url.clone(),
            timeout: Duration::from_secs(self.provider_timeout_secs),
        }
    }
}
