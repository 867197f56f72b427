//! A loaded location: the risk-scored graph plus everything derived from it.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{RouteError, RouteResult};
use crate::graph::RoadGraph;
use crate::havens::{self, SafeHavenRegistry};
use crate::incidents;
use crate::path::{ParallelEdgePolicy, PathFinder, RouteSummary};
use crate::risk::{PipelineReport, RiskCalculator, RiskSettings};
use crate::spatial::NodeLocator;

pub const INCIDENTS_FILE: &str = "incidents.json";
pub const HAVENS_FILE: &str = "safe_havens.json";

/// Immutable once built. Requests share it through an `Arc`.
pub struct Session {
    location: String,
    graph: RoadGraph,
    report: PipelineReport,
    locator: NodeLocator,
    havens: SafeHavenRegistry,
    policy: ParallelEdgePolicy,
}

impl Session {
    /// Score `graph` and build the lookup structures for it. Incidents and
    /// havens come from `data_dir`, falling back to the built-in sets.
    pub fn build(
        location: impl Into<String>,
        mut graph: RoadGraph,
        settings: &RiskSettings,
        policy: ParallelEdgePolicy,
        data_dir: &Path,
    ) -> RouteResult<Self> {
        let location = location.into();
        info!("Initializing session for {}", location);

        let incidents = incidents::load_or_generate(&data_dir.join(INCIDENTS_FILE))
            .map_err(|e| RouteError::InitializationFailure(e.to_string()))?;
        let calculator = RiskCalculator::new(settings.clone(), incidents);
        let report = calculator.run(&mut graph).map_err(|e| match e {
            RouteError::InitializationFailure(_) => e,
            other => RouteError::InitializationFailure(other.to_string()),
        })?;
        if report.skipped > 0 {
            warn!("Risk pipeline skipped {} elements", report.skipped);
        }

        let locator = NodeLocator::new(&graph);
        let haven_list = havens::load_or_default(&data_dir.join(HAVENS_FILE))
            .map_err(|e| RouteError::InitializationFailure(e.to_string()))?;
        let havens = SafeHavenRegistry::register(haven_list, &locator);
        info!("Indexed {} nodes, {} safe havens", locator.len(), havens.len());

        info!(
            "Session ready: {} nodes, {} edges, hour {} (x{})",
            graph.node_count(),
            graph.edge_count(),
            report.hour,
            report.time_multiplier
        );
        Ok(Self { location, graph, report, locator, havens, policy })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn report(&self) -> &PipelineReport {
        &self.report
    }

    pub fn havens(&self) -> &SafeHavenRegistry {
        &self.havens
    }

    pub fn path_finder(&self) -> PathFinder<'_> {
        PathFinder::new(&self.graph, self.policy)
    }

    /// Safest route between two coordinates, snapped to the nearest nodes.
    pub fn route(&self, start: (f64, f64), end: (f64, f64)) -> RouteResult<RouteSummary> {
        let (Some(source), Some(target)) =
            (self.locator.nearest(start.0, start.1), self.locator.nearest(end.0, end.1))
        else {
            return Err(RouteError::NotFound("Could not find nearby roads".into()));
        };

        let finder = self.path_finder();
        let path = finder
            .find_safest_route(source, target)
            .ok_or_else(|| RouteError::NotFound("No path found between these points".into()))?;
        Ok(finder.summarize(path))
    }
}

/// Holds the current session. Readers clone the `Arc` and never block a
/// reload for longer than the swap.
#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.read().clone()
    }

    /// Install `session`, returning the one it replaced.
    pub fn replace(&self, session: Session) -> Option<Arc<Session>> {
        let session = Arc::new(session);
        self.current.write().replace(session)
    }
}
