//! API error types with structured JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::HistoryError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    /// The AI service is misconfigured or still failing after retries.
    #[error("AI service unavailable: {0}")]
    AiUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::AiUnavailable(detail) => {
                tracing::warn!(detail, "AI service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "AI_UNAVAILABLE",
                    "The history generation service is unavailable, try again later"
                        .to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            HistoryError::InvalidRequest(detail) => ApiError::BadRequest(detail),
            HistoryError::Configuration(_)
            | HistoryError::RateLimited(_)
            | HistoryError::Timeout(_)
            | HistoryError::Unavailable(_) => ApiError::AiUnavailable(err.to_string()),
            HistoryError::Rendering(_) | HistoryError::Persistence(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

/// Body rejections (bad JSON, unknown enum values, wrong content type)
/// use the same error envelope as every other client error.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let response = ApiError::from(HistoryError::not_found("GeneratedHistory", "abc")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "GeneratedHistory not found: abc");
    }

    #[tokio::test]
    async fn invalid_request_returns_400_with_detail() {
        let response =
            ApiError::from(HistoryError::InvalidRequest("limit must be at least 1".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "limit must be at least 1");
    }

    #[tokio::test]
    async fn configuration_and_exhaustion_return_503() {
        for err in [
            HistoryError::Configuration("missing key".into()),
            HistoryError::RateLimited("quota".into()),
            HistoryError::Timeout("slow".into()),
            HistoryError::Unavailable("down".into()),
        ] {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "AI_UNAVAILABLE");
            // Provider details stay in the logs.
            assert!(!json["error"]["message"].as_str().unwrap().contains("key"));
        }
    }

    #[tokio::test]
    async fn rendering_failure_returns_500_without_detail() {
        let response = ApiError::from(HistoryError::Rendering("printpdf exploded".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn persistence_failure_returns_500() {
        let response = ApiError::from(HistoryError::Persistence("disk full".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }
}
