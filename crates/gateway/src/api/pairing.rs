//! Pairing endpoint.
//!
//! `GET /code?number=<phone>` starts a pairing session and answers with
//! `{ "code": <string> }` once the session has something to say: the
//! pairing code, or the reason it failed.  The session keeps running after
//! the reply.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::runtime::PairingReply;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    #[serde(default)]
    pub number: Option<String>,
}

pub async fn request_code(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Response {
    let raw = query.number.unwrap_or_default();
    let pending = match state.supervisor.start(&raw) {
        Ok(pending) => pending,
        Err(e) => return reply_response(&PairingReply::Failed(e)),
    };
    let request_id = pending.request_id.clone();
    let (reply, _task) = pending.reply().await;
    tracing::debug!(request_id = %request_id, status = reply.status_code(), "pairing reply");
    reply_response(&reply)
}

fn reply_response(reply: &PairingReply) -> Response {
    let status =
        StatusCode::from_u16(reply.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "code": reply.message() }))).into_response()
}
