//! Error types for chat-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::relay::failover::AttemptFailure;

/// Result type alias for chat-relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chat-relay.
///
/// Only these cross the HTTP boundary; individual upstream failures stay
/// inside the relay loop and surface here only as [`Error::Exhausted`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("No API credentials are configured for this request")]
    NoCredentials,

    #[error("All providers are busy, please try again shortly")]
    Exhausted { failures: Vec<AttemptFailure> },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NoCredentials => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Exhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Error::Exhausted { failures } => serde_json::json!({
                "error": self.to_string(),
                "details": failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::failover::FailureKind;

    async fn body_json(error: Error) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn exhausted_is_429_with_details() {
        let (status, json) = body_json(Error::Exhausted {
            failures: vec![
                AttemptFailure {
                    provider: "groq".to_string(),
                    kind: FailureKind::rejected(401, "invalid key"),
                },
                AttemptFailure {
                    provider: "gemini".to_string(),
                    kind: FailureKind::Timeout,
                },
            ],
        })
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json["details"],
            serde_json::json!(["groq: HTTP 401: invalid key", "gemini: timed out"])
        );
        assert!(json["error"].as_str().unwrap().contains("busy"));
    }

    #[tokio::test]
    async fn no_credentials_is_500_without_details() {
        let (status, json) = body_json(Error::NoCredentials).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json.get("details").is_none());
        assert!(json["error"].as_str().unwrap().contains("credentials"));
    }

    #[test]
    fn validation_statuses() {
        assert_eq!(
            Error::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
