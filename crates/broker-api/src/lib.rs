//! Broker API crate - the axum HTTP surface of the assistant.
//!
//! Serves the chat endpoint, session clearing, the read-only catalog views
//! and a health check. All conversational behaviour lives in `broker-chat`;
//! handlers here only translate between HTTP and the orchestrator.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
