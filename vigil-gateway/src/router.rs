use axum::Router;
use axum::routing::{get, post};

use crate::handlers::{answer_handler, health_handler, retrieve_handler};
use crate::server::AppState;

/// Build the query API router.
///
/// - `POST /v1/retrieve` — `{"query": string, "k": integer}` → ranked
///   `[{"text","source","score"}, ...]`
/// - `POST /v1/answer` — `{"query": string, "k"?: integer}` → retrieval
///   plus an optional composed answer
/// - `GET /health` — liveness and corpus size
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/retrieve", post(retrieve_handler))
        .route("/v1/answer", post(answer_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
