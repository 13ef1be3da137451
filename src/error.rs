//! Error types for Convene
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Federation verification failures are modeled as distinct variants so
/// the inbox route can map them to HTTP statuses without string matching.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Access denied (403)
    #[error("Access denied")]
    Forbidden,

    /// No Signature header on an inbox request (401)
    #[error("Missing Signature header")]
    MissingSignature,

    /// Signature header present but not parseable (401)
    #[error("Malformed Signature header: {0}")]
    MalformedSignature(String),

    /// Signature did not verify against the fetched key (401)
    #[error("Invalid signature")]
    SignatureInvalid,

    /// The signing actor's document could not be fetched (500)
    #[error("Actor unreachable: {0}")]
    ActorUnreachable(String),

    /// Verified activity that cannot be interpreted (422)
    #[error("Unprocessable activity: {0}")]
    Unprocessable(String),

    /// No signing key stored for a local actor (500, data-integrity bug)
    #[error("No signing key for actor {0}")]
    KeyMissing(String),

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Outbound federation error (502)
    #[error("Federation error: {0}")]
    Federation(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string(), "forbidden"),
            AppError::MissingSignature => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "missing_signature",
            ),
            AppError::MalformedSignature(msg) => {
                (StatusCode::UNAUTHORIZED, msg.clone(), "malformed_signature")
            }
            AppError::SignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "signature_invalid",
            ),
            AppError::ActorUnreachable(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
                "actor_unreachable",
            ),
            AppError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                msg.clone(),
                "unprocessable",
            ),
            AppError::KeyMissing(actor_id) => {
                tracing::error!(actor_id = %actor_id, "No signing key stored for local actor");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "key_missing",
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                self.to_string(),
                "rate_limited",
            ),
            AppError::Federation(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), "federation"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
