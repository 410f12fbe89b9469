//! Error types for the catalog sync plugin.
//!
//! A single crate-level error enum covers configuration, validation, storage
//! and Stripe API failures, and maps onto HTTP responses for the plugin's
//! inbound routes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// Errors produced by the catalog sync plugin.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resource not found (404 Not Found)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request from the client (400 Bad Request)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A local record failed validation before a remote call (400 Bad Request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plugin configuration is invalid or incomplete (500 Internal Server Error)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Webhook signature verification failed (400 Bad Request)
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    /// Webhook timestamp outside the allowed tolerance (400 Bad Request)
    #[error("Webhook timestamp too old ({age_seconds}s)")]
    WebhookTimestampExpired {
        /// Age of the webhook timestamp in seconds.
        age_seconds: i64,
    },

    /// Webhook payload could not be parsed (400 Bad Request)
    #[error("Invalid webhook payload: {message}")]
    InvalidWebhookPayload {
        /// What was wrong with the payload.
        message: String,
    },

    /// A Stripe API call failed (502 Bad Gateway)
    #[error("Stripe API error during {operation}: {message}")]
    StripeApi {
        /// The operation that failed (e.g. "create_product").
        operation: String,
        /// Error message from Stripe.
        message: String,
        /// Stripe error code if available.
        code: Option<String>,
        /// HTTP status code from Stripe if available.
        http_status: Option<u16>,
    },

    /// The local record store failed (500 Internal Server Error)
    #[error("Store error: {0}")]
    Store(String),

    /// A required external dependency is unavailable (503 Service Unavailable)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500 Internal Server Error)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Wrapped anyhow error for application flexibility
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a NotFound error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a BadRequest error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a Validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create an Internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable at the transport level.
    ///
    /// Rate limits (429) and Stripe server errors (5xx) are worth retrying;
    /// everything else is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StripeApi { http_status, .. } => {
                matches!(http_status, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_)
            | Self::Validation(_)
            | Self::InvalidWebhookSignature
            | Self::WebhookTimestampExpired { .. }
            | Self::InvalidWebhookPayload { .. } => StatusCode::BAD_REQUEST,
            Self::StripeApi { .. } => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Store(_) | Self::Internal(_) | Self::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns an error message safe to expose to HTTP clients.
    ///
    /// Client errors (4xx) carry their actual message; server-side failures
    /// return a generic message so internals are never disclosed, while the
    /// full error is logged server-side.
    fn safe_message(&self) -> String {
        match self {
            Self::NotFound(msg) => format!("Not found: {}", msg),
            Self::BadRequest(msg) => format!("Bad request: {}", msg),
            Self::Validation(msg) => format!("Validation error: {}", msg),
            Self::InvalidWebhookSignature => "Invalid webhook signature".to_string(),
            Self::WebhookTimestampExpired { .. } => "Webhook timestamp too old".to_string(),
            Self::InvalidWebhookPayload { .. } => "Invalid webhook payload".to_string(),
            Self::ServiceUnavailable(msg) => format!("Service unavailable: {}", msg),
            Self::StripeApi { .. } => "Upstream billing provider error".to_string(),
            Self::Config(_) | Self::Store(_) | Self::Internal(_) | Self::Anyhow(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Full error detail stays in the server logs only.
        tracing::error!(
            target: "stripe_catalog_sync",
            status = status.as_u16(),
            error = %self,
            "Request failed"
        );

        let body = Json(ErrorResponse {
            error: self.safe_message(),
        });

        (status, body).into_response()
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
