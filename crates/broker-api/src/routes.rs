//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use broker_core::config::BrokerConfig;
use broker_core::error::BrokerError;

use crate::handlers;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;

/// Global request body limit.
const BODY_LIMIT: usize = 1024 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // The chat widget is served from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let limiter = RateLimiter::new(state.config.chat.rate_limit_per_sec);

    // Every chat turn costs several LLM calls, so only /chat is limited.
    let chat_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .layer(axum::middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(limiter));

    let routes = Router::new()
        .route("/clear-session", post(handlers::clear_session))
        .route("/properties", get(handlers::list_properties))
        .route("/properties/{id}", get(handlers::property_detail))
        .route("/health", get(handlers::health));

    chat_routes
        .merge(routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind to the configured address and serve until the process exits.
pub async fn start_server(config: &BrokerConfig, state: AppState) -> Result<(), BrokerError> {
    let addr = format!("{}:{}", config.general.bind_address, config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BrokerError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| BrokerError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
