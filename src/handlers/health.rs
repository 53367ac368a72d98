use crate::error::{AppError, Result};
use crate::indexing::{self, IndexStatus};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexStatus>,
}

/// GET /health - Liveness probe
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /ready - Readiness probe.
///
/// Ready once start-up is complete and the store answers. The body reports
/// whether the stored index matches the running catalog; a stale index still
/// serves searches, so it does not fail the probe.
pub async fn ready_handler(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ReadyResponse>)> {
    if !state.is_ready() {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not_ready",
                version: env!("CARGO_PKG_VERSION"),
                index: None,
            }),
        ));
    }

    let check = Arc::clone(&state);
    let status = tokio::task::spawn_blocking(move || {
        indexing::index_status(
            check.service.registry(),
            check.service.embedder().model_name(),
            &check.store,
        )
    })
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))??;

    if !status.fresh {
        tracing::warn!(
            catalog_digest = %status.catalog_digest,
            indexed_digest = ?status.indexed_digest,
            missing = ?status.missing,
            "Tool index is stale; run `toolscout index`"
        );
    }

    Ok((
        StatusCode::OK,
        Json(ReadyResponse {
            status: "ready",
            version: env!("CARGO_PKG_VERSION"),
            index: Some(status),
        }),
    ))
}
