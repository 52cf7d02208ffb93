//! Error taxonomy shared by the sampler, process control and the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// A sub-metric whose data source could not be read this time.
/// Absorbed by the sampler; never reaches a client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unavailable: {reason}")]
pub struct Unavailable {
    pub reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The text-generation service answered badly or not at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Error: {0}")]
pub struct UpstreamFailure(pub String);

/// Failures of on-demand process operations.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("No process found with PID {0}")]
    NotFound(u32),

    #[error("Access denied to process {0}")]
    PermissionDenied(u32),

    #[error("{0}")]
    Other(String),
}

impl ControlError {
    pub fn status(&self) -> StatusCode {
        match self {
            ControlError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ControlError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP-facing wrapper; renders `{"error": "..."}` with the mapped status.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ControlError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
