use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backup_reader::ReaderError;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ReaderError> for AppError {
    fn from(err: ReaderError) -> Self {
        let msg = err.to_string();
        match err {
            ReaderError::NotFound(_) => AppError::NotFound(msg),
            ReaderError::InvalidPath(_) | ReaderError::Range(_) => AppError::BadRequest(msg),
            ReaderError::Configuration(_) | ReaderError::Archive(_) => AppError::Unprocessable(msg),
            ReaderError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                AppError::NotFound(msg)
            }
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}
