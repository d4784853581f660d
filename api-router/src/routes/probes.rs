use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::{api_state::ApiState, API_VERSION};

/// 200 for as long as the process can serve requests.
pub async fn live() -> impl IntoResponse {
    Json(json!({ "apiVersion": API_VERSION, "status": "ok" }))
}

/// Readiness probe: 200 while the package store answers, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "apiVersion": API_VERSION,
                "status": "ok",
                "checks": { "db": "ok" }
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "apiVersion": API_VERSION,
                    "status": "error",
                    "checks": { "db": "fail" }
                })),
            )
        }
    }
}
