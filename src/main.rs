use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use safe_route::api::{self, AppState};
use safe_route::config::Config;
use safe_route::provider::OverpassProvider;
use safe_route::store::GraphStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("safe_route=info")))
        .init();

    let config = Config::parse();
    std::fs::create_dir_all(&config.data_dir)?;

    let provider = Arc::new(OverpassProvider::new(config.overpass_config()));
    let state = Arc::new(AppState::new(
        GraphStore::new(&config.data_dir),
        provider,
        config.risk_settings(),
        config.parallel_edges,
    ));

    // Load the first saved location, if any
    let startup = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        let first = match startup.store().list() {
            Ok(locations) => locations.into_iter().next(),
            Err(e) => {
                warn!("Could not list saved locations: {}", e);
                None
            }
        };
        match first {
            Some(location) => match startup.load_saved(&location.id) {
                Ok(session) => info!("Auto-loaded: {}", session.location()),
                Err(e) => warn!("Could not load {}: {}", location.id, e),
            },
            None => info!("No saved locations. Download one via POST /api/download-location"),
        }
    })
    .await?;

    let app = api::create_router(state);
    info!("API server running on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
