//! Dashboard error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Position not open: {0}")]
    PositionNotFound(String),

    #[error("Close already in flight for {0}")]
    CloseInFlight(String),

    #[error("Close command failed: {0}")]
    CommandFailed(String),

    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server error: {0}")]
    Serve(String),
}

pub type DashboardResult<T> = Result<T, DashboardError>;

impl DashboardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PositionNotFound(_) => StatusCode::NOT_FOUND,
            Self::CloseInFlight(_) => StatusCode::CONFLICT,
            Self::CommandFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Bind { .. } | Self::Serve(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
