//! HTTP front end
//!
//! - `PUT /api/v1/live/{identifier}` launches the resources for `identifier`
//! - `GET /` is a liveness probe

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::launcher::ResourceLauncher;
use crate::{Error, APP_NAME};

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Launcher used by every request
    pub launcher: Arc<ResourceLauncher>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Every launch failure maps to 500; the message carries the detail
        let body = json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Build the router
pub fn router(launcher: Arc<ResourceLauncher>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/v1/live/", put(launch_empty))
        .route("/api/v1/live/{*identifier}", put(launch))
        .with_state(AppState { launcher })
}

/// Serve the router on `addr` until `shutdown` is cancelled
pub async fn serve(
    addr: SocketAddr,
    launcher: Arc<ResourceLauncher>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router(launcher))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "app": APP_NAME }))
}

async fn launch(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<Value>, Error> {
    let identifier = identifier.trim_matches('/').to_string();
    run_launch(state.launcher, identifier).await
}

async fn launch_empty(State(state): State<AppState>) -> Result<Json<Value>, Error> {
    run_launch(state.launcher, String::new()).await
}

/// Launch on a separate task
///
/// A client disconnect drops the handler future; the spawned launch still
/// runs to completion, including rollback of a partial launch.
async fn run_launch(
    launcher: Arc<ResourceLauncher>,
    identifier: String,
) -> Result<Json<Value>, Error> {
    tokio::spawn(async move { launcher.launch(&identifier).await }).await??;
    Ok(Json(json!({ "status": "ok" })))
}
