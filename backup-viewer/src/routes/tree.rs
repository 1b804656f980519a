use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use std::sync::Arc;

/// GET /tarinfo - compact JSON `[root]`
pub async fn tarinfo(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let body = tokio::task::spawn_blocking(move || {
        let tree = state.backups.list_tree()?;
        serde_json::to_vec(&[tree.as_ref()]).map_err(|e| AppError::Internal(e.into()))
    })
    .await??;

    Ok(([(header::CONTENT_TYPE, "application/json; charset=utf-8")], body))
}
