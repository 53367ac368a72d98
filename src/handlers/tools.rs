use crate::error::{AppError, Result};
use crate::protocol::{ExecuteOutcome, ExecuteToolInput, SearchOutcome, SearchToolsInput};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

/// How a rejected body is answered.
enum BadBody {
    /// Well-formed JSON with missing or mistyped fields; reported in the payload.
    Arguments(String),
    /// Not JSON at all; a transport error.
    Transport(AppError),
}

fn classify(rejection: JsonRejection) -> BadBody {
    match rejection {
        JsonRejection::JsonDataError(e) => {
            tracing::warn!(error = %e.body_text(), "Invalid arguments");
            BadBody::Arguments(format!("Invalid arguments: {}", e.body_text()))
        }
        other => BadBody::Transport(AppError::ValidationError(other.body_text())),
    }
}

/// POST /tools/search - Find tools relevant to a natural language query.
///
/// Always 200 for a JSON body; failures are reported in the
/// `status: "error"` payload.
pub async fn search_tools_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SearchToolsInput>, JsonRejection>,
) -> Result<Json<SearchOutcome>> {
    match payload.map_err(classify) {
        Ok(Json(input)) => Ok(Json(state.service.search(input).await)),
        Err(BadBody::Arguments(message)) => Ok(Json(SearchOutcome::error(message))),
        Err(BadBody::Transport(e)) => Err(e),
    }
}

/// POST /tools/execute - Run a tool by name.
pub async fn execute_tool_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ExecuteToolInput>, JsonRejection>,
) -> Result<Json<ExecuteOutcome>> {
    match payload.map_err(classify) {
        Ok(Json(input)) => Ok(Json(state.service.execute(input).await)),
        Err(BadBody::Arguments(message)) => Ok(Json(ExecuteOutcome::error(message))),
        Err(BadBody::Transport(e)) => Err(e),
    }
}
