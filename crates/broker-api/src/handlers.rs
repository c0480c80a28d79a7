//! Route handler functions for all API endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use broker_chat::{ChatReply, ChatRequest, ClearSessionResponse};
use broker_core::catalog::{CatalogPage, CatalogQuery};
use broker_geo::EnrichedListing;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request and response types
// =============================================================================

/// Body of `POST /clear-session`.
#[derive(Debug, Deserialize)]
pub struct ClearSessionRequest {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub version: String,
    pub uptime_secs: u64,
    pub property_count: usize,
}

// =============================================================================
// Chat
// =============================================================================

/// POST /chat - run one conversational turn.
///
/// Only invalid input is an HTTP error. Failures inside the turn come back
/// as a 200 reply with the `error_recovery` intent.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    debug!(
        session_id = ?request.session_id,
        history = request.history.len(),
        "Chat request received"
    );
    let reply = state.orchestrator.handle_turn(request).await?;
    Ok(Json(reply))
}

/// POST /clear-session - forget a server-side session.
pub async fn clear_session(
    State(state): State<AppState>,
    Json(request): Json<ClearSessionRequest>,
) -> Result<Json<ClearSessionResponse>, ApiError> {
    let session_id = request.session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }
    Ok(Json(state.orchestrator.clear_session(session_id)))
}

// =============================================================================
// Catalog views
// =============================================================================

/// GET /properties - filtered, paginated listing view.
pub async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Json<CatalogPage> {
    let page = state.catalog.query(&query);
    debug!(
        total = page.pagination.total,
        page = page.pagination.page,
        "Listing view served"
    );
    Json(page)
}

/// GET /properties/{id} - one property enriched with location facts.
pub async fn property_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EnrichedListing>, ApiError> {
    let listing = state
        .catalog
        .get(&id)
        .map(|p| p.to_listing())
        .ok_or_else(|| ApiError::NotFound(format!("Property {} not found", id)))?;

    let enriched = state.location.enrich(listing).await;
    info!(
        property_id = %id,
        enriched = enriched.location.is_some(),
        "Property detail served"
    );
    Ok(Json(enriched))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - liveness plus a few counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        property_count: state.catalog.len(),
    })
}
