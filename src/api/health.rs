use crate::api::AppState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks Redis when it backs the token cache.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let health = &state.health_service;
    if !health.has_redis() {
        return (StatusCode::OK, Json(HealthResponse { status: "ok".to_string(), redis: None }));
    }

    match health.check_redis().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok".to_string(), redis: Some("ok".to_string()) })),
        Err(e) => {
            tracing::warn!(error = %e, component = "redis", "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "error".to_string(), redis: Some("error".to_string()) }),
            )
        }
    }
}
