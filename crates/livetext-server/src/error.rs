//! Error types for the HTTP API.
//!
//! [`ApiError`] unifies the request-level failure modes into a single
//! enum that converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::store::StoreError;

/// Errors that can occur while handling an API request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body was not valid JSON.
    #[error("Invalid JSON format")]
    InvalidJson(#[source] serde_json::Error),

    /// The `text` field was missing, empty, or not a string.
    #[error("Invalid text provided")]
    InvalidText,

    /// The durable copy of the text could not be written.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidJson(_) | Self::InvalidText => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Storage(e) => {
                error!(error = %e, "Failed to persist text");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("Internal server error"),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
