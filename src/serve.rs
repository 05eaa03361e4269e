use crate::config::ServeConfig;
use std::path::PathBuf;

#[cfg(feature = "serve")]
#[derive(Clone)]
struct AppState {
    status_path: PathBuf,
}

/// Serve `/api/health` and `/api/status` until the process exits.
#[cfg(feature = "serve")]
pub async fn run(
    config: &ServeConfig,
    status_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use axum::{routing::get, Router};
    use tower_http::cors::CorsLayer;

    let state = AppState { status_path };

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(api_status))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("serve listening on {local_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(not(feature = "serve"))]
pub async fn run(
    _config: &ServeConfig,
    _status_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing::warn!("built without the serve feature; status endpoint disabled");
    Ok(())
}

#[cfg(feature = "serve")]
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"ok": true}))
}

#[cfg(feature = "serve")]
async fn api_status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, axum::http::StatusCode> {
    crate::status::read_status(&state.status_path)
        .map(axum::Json)
        .ok_or(axum::http::StatusCode::SERVICE_UNAVAILABLE)
}

#[cfg(all(test, feature = "serve"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_health() {
        let axum::Json(body) = health().await;
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_status_unavailable_before_first_write() {
        let dir = tempdir().unwrap();
        let state = AppState {
            status_path: dir.path().join("status"),
        };
        let result = api_status(axum::extract::State(state)).await;
        assert_eq!(
            result.unwrap_err(),
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_status_returns_file_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status");
        std::fs::write(&path, r#"{"state":"watching","tick":4}"#).unwrap();
        let state = AppState { status_path: path };

        let axum::Json(body) = api_status(axum::extract::State(state)).await.unwrap();
        assert_eq!(body["state"], "watching");
        assert_eq!(body["tick"], 4);
    }
}
