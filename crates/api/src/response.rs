//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error response body. Rate-limit errors carry the configured limit;
/// nothing else leaks internal detail.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// API error with its HTTP status.
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody { error: msg.into(), limit: None },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<beacon_core::Error> for ApiError {
    fn from(err: beacon_core::Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let (message, limit) = match &err {
            beacon_core::Error::RateLimit { limit } => (err.to_string(), Some(*limit)),
            // Unexpected failures get a generic message; the detail
            // stays in the logs.
            beacon_core::Error::Database(_) | beacon_core::Error::Internal(_) => {
                tracing::error!(error = %err, "internal error");
                ("internal error".to_string(), None)
            }
            _ => (err.to_string(), None),
        };

        Self { status, body: ErrorBody { error: message, limit } }
    }
}
