use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::GatewayError;
use crate::server::AppState;

#[derive(serde::Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub k: usize,
}

#[derive(serde::Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    records: usize,
}

fn error_response(err: GatewayError) -> Response {
    match err {
        GatewayError::InvalidArgument(_) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: err.to_string(),
            }),
        )
            .into_response(),
        err => {
            error!("Request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub(crate) async fn retrieve_handler(
    State(state): State<AppState>,
    Json(request): Json<RetrieveRequest>,
) -> Response {
    match state.service.retrieve(&request.query, request.k).await {
        Ok(results) => Json(results).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn answer_handler(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> Response {
    match state.service.answer(&request.query, request.k).await {
        Ok(composed) => Json(composed).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        records: state.service.record_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_request_deserializes() {
        let json = r#"{"query":"Galwan activity","k":3}"#;
        let request: RetrieveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.query, "Galwan activity");
        assert_eq!(request.k, 3);
    }

    #[test]
    fn answer_request_defaults_k() {
        let json = r#"{"query":"status report"}"#;
        let request: AnswerRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.k, 5);
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 42,
            records: 7,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"records\":7"));
    }
}
