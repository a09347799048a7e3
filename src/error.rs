use crate::services::fcm::PushError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Sending Failed: {0}")]
    SendFailed(#[from] PushError),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self {
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                json!({ "error": msg })
            }
            Self::SendFailed(e) => {
                tracing::warn!(error = %e, reason = e.reason(), "Sending failed");
                json!({ "error": "Sending Failed", "description": e.to_string() })
            }
        };

        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_send_failure_shape() {
        let (status, body) = render(AppError::from(PushError::Unregistered)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Sending Failed");
        assert_eq!(body["description"], "The provided registration token is not registered with FCM");
    }

    #[tokio::test]
    async fn test_bad_request_shape() {
        let (status, body) = render(AppError::BadRequest("Token is required".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Token is required" }));
    }
}
