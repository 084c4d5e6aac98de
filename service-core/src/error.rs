use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(anyhow::Error),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Endpoint not found: {0}")]
    RouteNotFound(String),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::StorageUnavailable(_)
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::StorageUnavailable(anyhow::Error::new(err))
    }
}

/// JSON body shared by every failed response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            path: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage and internal causes stay in the logs.
        let body = match self {
            AppError::ValidationError(msg) => ErrorBody::new(msg),
            AppError::NotFound(msg) => ErrorBody::new(msg),
            AppError::MethodNotAllowed => ErrorBody::new("Method not allowed"),
            AppError::RouteNotFound(path) => ErrorBody {
                path: Some(path),
                ..ErrorBody::new("Endpoint not found")
            },
            AppError::StorageUnavailable(err) => {
                tracing::error!(error = %err, "Storage operation failed");
                ErrorBody::new("Storage unavailable")
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                ErrorBody::new("Internal server error")
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                ErrorBody::new("Configuration error")
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_error_is_bad_request() {
        let (status, body) = body_json(AppError::validation("content is required")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "content is required");
    }

    #[tokio::test]
    async fn storage_error_does_not_leak_details() {
        let err = AppError::StorageUnavailable(anyhow::anyhow!("connection refused on 10.1.1.1"));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Storage unavailable");
        assert!(!body.to_string().contains("10.1.1.1"));
    }

    #[tokio::test]
    async fn route_not_found_echoes_path() {
        let (status, body) = body_json(AppError::RouteNotFound("/api/nope".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
        assert_eq!(body["path"], "/api/nope");
    }

    #[tokio::test]
    async fn method_not_allowed_is_405() {
        let (status, body) = body_json(AppError::MethodNotAllowed).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "Method not allowed");
    }
}
