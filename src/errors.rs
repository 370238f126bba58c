use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::gateway::GatewayError;
use crate::services::runs::RunError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("AI provider error: {0}")]
    Ai(#[from] GatewayError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(id) => AppError::NotFound(format!("run {id}")),
            other => AppError::Conflict(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Ai(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
