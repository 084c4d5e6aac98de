use crate::services::metrics::get_metrics;
use crate::startup::AppState;
use axum::{
    extract::{OriginalUri, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use service_core::error::AppError;

/// Liveness plus database connectivity.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    match state.repository.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "OK",
                "database": "Connected",
                "timestamp": timestamp,
                "uptime": state.started_at.elapsed().as_secs_f64(),
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "ERROR",
                    "database": "Disconnected",
                    "timestamp": timestamp,
                })),
            )
        }
    }
}

/// Readiness endpoint for orchestrators.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.repository.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        get_metrics(),
    )
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

pub async fn route_not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::RouteNotFound(uri.path().to_string())
}
