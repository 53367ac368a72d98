pub mod health;
pub mod tools;

pub use health::{health_handler, ready_handler};
pub use tools::{execute_tool_handler, search_tools_handler};

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Protocol and probe routes. `/metrics` is added by the binary, which owns
/// the Prometheus recorder.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tools/search", post(search_tools_handler))
        .route("/tools/execute", post(execute_tool_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
