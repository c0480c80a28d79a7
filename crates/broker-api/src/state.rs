//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use broker_chat::ChatOrchestrator;
use broker_core::catalog::Catalog;
use broker_core::config::BrokerConfig;
use broker_geo::LocationService;

/// Shared application state.
///
/// Every field is behind an `Arc`, so cloning per request is cheap. The
/// orchestrator guards its own session map.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BrokerConfig>,
    /// Dialogue engine handling `/chat` and `/clear-session`.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Property catalog backing the listing views.
    pub catalog: Arc<Catalog>,
    /// Geocoding and POI lookups used to enrich property details.
    pub location: Arc<LocationService>,
    /// Server start time for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: BrokerConfig,
        orchestrator: ChatOrchestrator,
        catalog: Arc<Catalog>,
        location: Arc<LocationService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            catalog,
            location,
            start_time: Instant::now(),
        }
    }
}
