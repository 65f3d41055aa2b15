//! Error handling module
//!
//! Crate-wide error type and its HTTP response conversion, so host route
//! handlers can return subsystem errors directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::confirm_code::ConfirmCodeError;
use crate::receipt::ReceiptError;

/// Crate-wide Result type
pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    #[error(transparent)]
    ConfirmCode(#[from] ConfirmCodeError),

    #[error(transparent)]
    Init(#[from] crate::init::InitError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl AuthzError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthzError::Receipt(e) => match e {
                ReceiptError::NotFound => (StatusCode::NOT_FOUND, "receipt_not_found"),
                ReceiptError::Expired => (StatusCode::GONE, "receipt_expired"),
                ReceiptError::AlreadyConsumed => (StatusCode::CONFLICT, "receipt_consumed"),
                ReceiptError::InvalidLifetime(_) => (StatusCode::BAD_REQUEST, "invalid_lifetime"),
                ReceiptError::CommandNotFound(_)
                | ReceiptError::InvalidArguments(_)
                | ReceiptError::CommandFailed(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "command_error")
                }
                ReceiptError::StoreUnavailable(_) | ReceiptError::Disposed => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
                }
                ReceiptError::GenerationFailure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "generation_failure")
                }
            },
            AuthzError::ConfirmCode(ConfirmCodeError::InvalidKey) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            AuthzError::ConfirmCode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AuthzError::Init(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_initialized"),
            AuthzError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        }
    }

    /// Message for the end user; internal details stay in the logs
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthzError::Receipt(e) => e.user_message(),
            AuthzError::ConfirmCode(ConfirmCodeError::InvalidKey) => "The request was invalid.",
            _ => "Something went wrong on our side. Please try again later.",
        }
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = %self, error_code, "Deferred action failed");
        }

        let body = ErrorResponse {
            error: self.user_message().to_string(),
            error_code: error_code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::StoreError;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_expected_outcomes_are_polite() {
        let response = AuthzError::from(ReceiptError::Expired).into_response();
        assert_eq!(response.status(), StatusCode::GONE);

        let body = body_json(response).await;
        assert_eq!(body["error_code"], "receipt_expired");
        assert!(body["error"].as_str().unwrap().contains("expired"));
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let err = AuthzError::from(ReceiptError::StoreUnavailable(StoreError::Corrupt(
            "row 42 has garbage".into(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().contains("row 42"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ReceiptError::NotFound, StatusCode::NOT_FOUND),
            (ReceiptError::AlreadyConsumed, StatusCode::CONFLICT),
            (
                ReceiptError::CommandNotFound("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ReceiptError::InvalidLifetime(0), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(AuthzError::from(err).status_and_code().0, status);
        }
    }
}
