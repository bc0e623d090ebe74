//! Error types for the observer API.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vegha_core::PlaybackError;

/// Errors that can occur in the observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// Bounds were requested with no active run.
    #[error("simulation not running")]
    NotRunning,

    /// A command was malformed or rejected.
    #[error("{0}")]
    InvalidCommand(String),

    /// The simulator could not be started.
    #[error("{0}")]
    SimulatorUnavailable(String),
}

impl ObserverError {
    /// HTTP status for this error.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotRunning => StatusCode::CONFLICT,
            Self::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            Self::SimulatorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<PlaybackError> for ObserverError {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::BoundsUnavailable => Self::NotRunning,
            PlaybackError::InvalidSpeed { .. } => Self::InvalidCommand(e.to_string()),
            PlaybackError::Adapter(inner) => Self::SimulatorUnavailable(inner.to_string()),
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
