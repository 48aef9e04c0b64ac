pub mod health;
pub mod pairing;
pub mod sessions;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/code", get(pairing::request_code))
        .route("/health", get(health::health))
        .route("/v1/sessions", get(sessions::list_sessions))
}
