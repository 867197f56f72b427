//! REST API.
//!
//! - `GET  /health`
//! - `GET  /api/status`
//! - `GET  /api/locations`
//! - `POST /api/load-location`
//! - `POST /api/download-location`
//! - `POST /api/route-with-instructions`
//! - `GET  /api/safe-havens`
//!
//! Loading, downloading and routing are CPU or network bound and run on the
//! blocking pool. Only one load or download runs at a time; routing keeps
//! serving the previous session until the new one is swapped in.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::{RouteError, RouteResult};
use crate::graph::RoadGraph;
use crate::havens::SafeHaven;
use crate::path::{Coordinate, ParallelEdgePolicy, RouteInstruction};
use crate::provider::GraphProvider;
use crate::risk::{PipelineReport, RiskSettings};
use crate::session::{Session, SessionStore};
use crate::store::{self, GraphStore, LocationMetadata, SavedLocation};

const DEFAULT_RADIUS_M: f64 = 5000.0;

/// Shared across handlers.
pub struct AppState {
    sessions: SessionStore,
    store: GraphStore,
    provider: Arc<dyn GraphProvider>,
    settings: RiskSettings,
    policy: ParallelEdgePolicy,
    load_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(
        store: GraphStore,
        provider: Arc<dyn GraphProvider>,
        settings: RiskSettings,
        policy: ParallelEdgePolicy,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            store,
            provider,
            settings,
            policy,
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Load a stored location and make it current. Blocking.
    pub fn load_saved(&self, key: &str) -> RouteResult<Arc<Session>> {
        let graph = self.store.load(key)?;
        info!("Loaded {}: {} nodes, {} edges", key, graph.node_count(), graph.edge_count());
        if let Some(meta) = self.store.metadata(key) {
            info!("{} downloaded {} (radius {} m)", meta.location, meta.download_time.to_rfc3339(), meta.radius);
        }
        self.install(key, graph)
    }

    /// Fetch a place from the provider, persist it and make it current.
    /// Blocking.
    pub fn download(&self, place: &str, radius_m: f64) -> RouteResult<(Arc<Session>, LocationMetadata)> {
        let key = store::location_key(place);
        store::checked_key(&key)?;
        let graph = self
            .provider
            .fetch(place, radius_m)
            .map_err(|e| RouteError::ExternalAcquisitionFailure(format!("{e:#}")))?;

        let metadata = LocationMetadata {
            location: place.to_string(),
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            download_time: Utc::now(),
            radius: radius_m,
        };
        self.store.save(&key, &graph, &metadata)?;
        let session = self.install(&key, graph)?;
        Ok((session, metadata))
    }

    fn install(&self, key: &str, graph: RoadGraph) -> RouteResult<Arc<Session>> {
        let session = Session::build(key, graph, &self.settings, self.policy, self.store.dir())?;
        self.sessions.replace(session);
        self.sessions
            .current()
            .ok_or_else(|| RouteError::InitializationFailure("session was not installed".into()))
    }
}

/// Creates the API router with permissive CORS.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/status", get(status))
        .route("/api/locations", get(list_locations))
        .route("/api/load-location", post(load_location))
        .route("/api/download-location", post(download_location))
        .route("/api/route-with-instructions", post(route_with_instructions))
        .route("/api/safe-havens", get(safe_havens))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// `RouteError` rendered as `{error, category}` with a matching status.
#[derive(Debug)]
pub struct ApiError(RouteError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    category: &'static str,
}

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            RouteError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::InitializationFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouteError::ExternalAcquisitionFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self.0);
        }
        let body = ErrorBody { error: self.0.to_string(), category: self.0.category() };
        (status, Json(body)).into_response()
    }
}

fn no_data(rejection: JsonRejection) -> ApiError {
    RouteError::InvalidInput(format!("Invalid request body: {}", rejection.body_text())).into()
}

/// Runs `work` on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> RouteResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RouteError::InitializationFailure(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

// ============================================================================
// Status & locations
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub location_loaded: bool,
    pub current_location: Option<String>,
    pub nodes: usize,
    pub edges: usize,
    /// How the current graph was scored.
    pub risk: Option<PipelineReport>,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let session = state.sessions.current();
    Json(StatusResponse {
        status: "running".into(),
        location_loaded: session.is_some(),
        current_location: session.as_ref().map(|s| s.location().to_string()),
        nodes: session.as_ref().map_or(0, |s| s.graph().node_count()),
        edges: session.as_ref().map_or(0, |s| s.graph().edge_count()),
        risk: session.as_ref().map(|s| s.report().clone()),
    })
}

#[derive(Serialize)]
struct LocationsResponse {
    locations: Vec<SavedLocation>,
}

async fn list_locations(State(state): State<Arc<AppState>>) -> Result<Json<LocationsResponse>, ApiError> {
    let locations = state.store.list().map_err(RouteError::from)?;
    Ok(Json(LocationsResponse { locations }))
}

// ============================================================================
// Loading
// ============================================================================

#[derive(Deserialize)]
struct LoadRequest {
    file: Option<String>,
}

#[derive(Serialize)]
struct LoadResponse {
    success: bool,
    location: String,
    nodes: usize,
    edges: usize,
}

async fn load_location(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoadRequest>, JsonRejection>,
) -> Result<Json<LoadResponse>, ApiError> {
    let Json(request) = payload.map_err(no_data)?;
    let file = request
        .file
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| RouteError::InvalidInput("File required".into()))?;
    let key = GraphStore::resolve_key(&file);

    let _guard = state.load_lock.lock().await;
    let worker = Arc::clone(&state);
    let session = blocking(move || worker.load_saved(&key)).await?;

    Ok(Json(LoadResponse {
        success: true,
        location: session.location().to_string(),
        nodes: session.graph().node_count(),
        edges: session.graph().edge_count(),
    }))
}

#[derive(Deserialize)]
struct DownloadRequest {
    location: Option<String>,
    #[serde(default = "default_radius")]
    radius: f64,
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_M
}

#[derive(Serialize)]
struct DownloadResponse {
    success: bool,
    location: String,
    stats: LocationMetadata,
}

async fn download_location(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(request) = payload.map_err(no_data)?;
    let place = request
        .location
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| RouteError::InvalidInput("Location required".into()))?;
    if !request.radius.is_finite() || request.radius <= 0.0 {
        return Err(RouteError::InvalidInput(format!("Invalid radius {}", request.radius)).into());
    }

    let _guard = state.load_lock.lock().await;
    let worker = Arc::clone(&state);
    let (session, stats) = blocking(move || worker.download(&place, request.radius)).await?;
    info!("Downloaded and loaded: {}", stats.location);

    Ok(Json(DownloadResponse { success: true, location: session.location().to_string(), stats }))
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Deserialize)]
struct PointDto {
    lat: Option<f64>,
    #[serde(alias = "lng")]
    lon: Option<f64>,
}

impl PointDto {
    fn coordinates(&self, which: &str) -> RouteResult<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Ok((lat, lon)),
            _ => Err(RouteError::InvalidInput(format!("Invalid coordinate format for {which} point"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteRequest {
    start: Option<PointDto>,
    end: Option<PointDto>,
}

#[derive(Serialize)]
struct RouteStatistics {
    risk: f64,
    distance_m: f64,
    distance_km: f64,
    time_min: f64,
    mode: &'static str,
}

#[derive(Serialize)]
struct RouteResponse {
    success: bool,
    path: Vec<Coordinate>,
    instructions: Vec<RouteInstruction>,
    statistics: RouteStatistics,
}

async fn route_with_instructions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RouteRequest>, JsonRejection>,
) -> Result<Json<RouteResponse>, ApiError> {
    let session = state
        .sessions
        .current()
        .ok_or_else(|| RouteError::InvalidInput("No location loaded. Please download a location first.".into()))?;

    let Json(request) = payload.map_err(no_data)?;
    let (Some(start), Some(end)) = (request.start, request.end) else {
        return Err(RouteError::InvalidInput("Start and end points required".into()).into());
    };
    let start = start.coordinates("start")?;
    let end = end.coordinates("end")?;
    info!("Route request from ({:.4}, {:.4}) to ({:.4}, {:.4})", start.0, start.1, end.0, end.1);

    let summary = blocking(move || session.route(start, end)).await?;
    info!(
        "Route stats: {}km, {}min, risk: {:.2}",
        summary.distance_km, summary.time_min, summary.risk
    );

    Ok(Json(RouteResponse {
        success: true,
        path: summary.coordinates,
        instructions: summary.instructions,
        statistics: RouteStatistics {
            risk: summary.risk,
            distance_m: summary.distance_m,
            distance_km: summary.distance_km,
            time_min: summary.time_min,
            mode: "safest",
        },
    }))
}

// ============================================================================
// Safe havens
// ============================================================================

#[derive(Serialize)]
struct HavensResponse {
    havens: Vec<SafeHaven>,
}

async fn safe_havens(State(state): State<Arc<AppState>>) -> Json<HavensResponse> {
    let havens = state.sessions.current().map(|s| s.havens().havens().to_vec()).unwrap_or_default();
    Json(HavensResponse { havens })
}
