use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    /// A WebSocket endpoint was called without an upgrade
    #[error("{0}")]
    UpgradeRequired(String),

    /// The server cannot take another call right now
    #[error("{0}")]
    ServiceUnavailable(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UpgradeRequired(_) => StatusCode::UPGRADE_REQUIRED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));

        match self {
            AppError::UpgradeRequired(_) => {
                (status, [("upgrade", "websocket")], body).into_response()
            }
            AppError::ServiceUnavailable(_) => (status, body).into_response(),
        }
    }
}
