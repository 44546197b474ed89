use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::access::codec::TokenError;
use crate::payments::webhook::WebhookError;
use crate::payments::PaymentError;
use crate::resume::extract::ExtractError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// No usable access token. Covers "never paid", "expired" and "tampered" alike.
    #[error("Payment required")]
    PaymentRequired,

    #[error("Payment not confirmed")]
    PaymentNotConfirmed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Payment gateway error: {0}")]
    Payment(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Configuration => AppError::Configuration(err.to_string()),
            TokenError::InvalidArgument(msg) => AppError::Validation(msg.to_string()),
            TokenError::Rejected => AppError::PaymentRequired,
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::UnknownSession => AppError::PaymentNotConfirmed,
            PaymentError::InvalidSessionId => {
                AppError::Validation("session_id is not a valid checkout session id".to_string())
            }
            other => AppError::Payment(other.to_string()),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Secret => AppError::Configuration(err.to_string()),
            other => AppError::Validation(format!("Invalid webhook signature: {other}")),
        }
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        AppError::UnprocessableEntity(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg.clone(),
            ),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::PaymentRequired => (
                StatusCode::UNAUTHORIZED,
                "PAYMENT_REQUIRED",
                "Please complete checkout to unlock this feature".to_string(),
            ),
            AppError::PaymentNotConfirmed => (
                StatusCode::FORBIDDEN,
                "PAYMENT_NOT_CONFIRMED",
                "Payment not confirmed".to_string(),
            ),
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "The service is not fully configured".to_string(),
                )
            }
            AppError::Payment(msg) => {
                tracing::error!("Payment gateway error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PAYMENT_GATEWAY_ERROR",
                    "The payment provider could not be reached".to_string(),
                )
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "S3_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
