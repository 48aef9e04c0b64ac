//! Introspection of in-flight pairing requests.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /v1/sessions: list pairing requests that have not finished.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.supervisor.active();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}
