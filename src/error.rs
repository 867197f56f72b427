//! Error types shared by the routing core and the HTTP layer.

use petgraph::graph::{EdgeIndex, NodeIndex};
use thiserror::Error;

/// User-facing failure, grouped by what the caller should do about it.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No nearby node, no path between nodes, or an unknown location file.
    #[error("{0}")]
    NotFound(String),

    /// Missing or malformed coordinates and request fields.
    #[error("{0}")]
    InvalidInput(String),

    /// The risk pipeline or a session component could not be built.
    #[error("failed to initialize components: {0}")]
    InitializationFailure(String),

    /// The graph provider call failed.
    #[error("graph acquisition failed: {0}")]
    ExternalAcquisitionFailure(String),
}

impl RouteError {
    /// Stable machine-readable category name.
    pub fn category(&self) -> &'static str {
        match self {
            RouteError::NotFound(_) => "not_found",
            RouteError::InvalidInput(_) => "invalid_input",
            RouteError::InitializationFailure(_) => "initialization_failure",
            RouteError::ExternalAcquisitionFailure(_) => "external_acquisition_failure",
        }
    }
}

/// A single edge or node the risk pipeline could not score.
///
/// These never abort a pass; the element is logged and left untouched.
#[derive(Debug, Error, PartialEq)]
pub enum ElementError {
    #[error("edge {0:?} has an invalid length {1}")]
    InvalidLength(EdgeIndex, f64),

    #[error("edge {0:?} has a non-finite risk {1}")]
    InvalidRisk(EdgeIndex, f64),

    #[error("node {0:?} has non-finite coordinates")]
    InvalidCoordinates(NodeIndex),

    #[error("edge {0:?} is missing an endpoint")]
    MissingEndpoint(EdgeIndex),
}

/// Failures reading or writing persisted graphs.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("location '{0}' not found")]
    UnknownLocation(String),

    #[error("'{0}' is not a valid location key")]
    InvalidKey(String),

    #[error("stored graph version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored graph is corrupt: {0}")]
    Corrupt(String),

    #[error("PBF import failed: {0}")]
    Pbf(String),
}

impl From<StoreError> for RouteError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownLocation(_) => RouteError::NotFound(e.to_string()),
            StoreError::InvalidKey(_) => RouteError::InvalidInput(e.to_string()),
            other => RouteError::InitializationFailure(other.to_string()),
        }
    }
}

pub type RouteResult<T> = Result<T, RouteError>;
