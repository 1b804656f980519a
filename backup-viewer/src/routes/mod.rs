pub mod download;
pub mod health;
pub mod tree;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let index_html = static_dir.join("index.html");

    Router::new()
        .route("/tarinfo", get(tree::tarinfo))
        .route("/download", get(download::download))
        .route("/health", get(health::health))
        .fallback_service(ServeDir::new(&static_dir).fallback(ServeFile::new(index_html)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::test_support::{app, body_bytes, get};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unknown_paths_fall_back_to_index() {
        let backups = TempDir::new().unwrap();
        let assets = TempDir::new().unwrap();
        std::fs::write(assets.path().join("index.html"), "<html>viewer</html>").unwrap();
        std::fs::write(assets.path().join("script.js"), "console.log(1)").unwrap();

        let response = get(app(backups.path(), assets.path()), "/script.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"console.log(1)");

        let response = get(app(backups.path(), assets.path()), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"<html>viewer</html>");

        let response = get(app(backups.path(), assets.path()), "/no/such/page").await;
        assert_eq!(body_bytes(response).await, b"<html>viewer</html>");
    }
}
