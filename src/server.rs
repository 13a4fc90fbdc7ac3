use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::workers::WorkerPool;

/// Build the webhook router: `POST {path}` accepts deliveries, `GET /health` reports counters.
pub fn router(pool: WorkerPool, path: &str) -> Router {
    Router::new()
        .route(path, post(receive))
        .route("/health", get(health))
        .with_state(Arc::new(pool))
}

async fn receive(
    State(pool): State<Arc<WorkerPool>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejected webhook body: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            );
        }
    };

    match pool.submit(payload) {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Err(e) => {
            warn!("Failed to queue delivery: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
        }
    }
}

async fn health(State(pool): State<Arc<WorkerPool>>) -> Json<Value> {
    Json(json!({ "status": "ok", "deliveries": pool.stats().snapshot() }))
}

/// Serve until Ctrl-C
pub async fn serve(config: &ServerConfig, pool: WorkerPool) -> Result<()> {
    let app = router(pool, &config.path);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen))?;

    info!("Listening for webhooks on http://{}{}", config.listen, config.path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
