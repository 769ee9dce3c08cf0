use analysis_worker::WorkerError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    EngineUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<WorkerError> for AppError {
    fn from(err: WorkerError) -> Self {
        match err {
            e if e.is_client_error() => AppError::BadRequest(e.to_string()),
            WorkerError::EngineUnavailable(msg) => AppError::EngineUnavailable(msg),
            e => AppError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::EngineUnavailable(msg) => {
                tracing::warn!("Engine unavailable: {msg}");
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        (status, Json(json!({ "detail": message }))).into_response()
    }
}
