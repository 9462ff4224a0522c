use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Init,
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub status: RunStatus,
    /// Epoch seconds of the last finished cycle
    pub last_run_ts: Option<i64>,
}

/// Last-cycle status; written by the scan loop, read by the health endpoint.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, status: RunStatus, at: DateTime<Utc>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = StatusSnapshot {
            status,
            last_run_ts: Some(at.timestamp()),
        };
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

async fn health(State(status): State<StatusHandle>) -> Json<StatusSnapshot> {
    Json(status.snapshot())
}

pub fn router(status: StatusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(status)
}

/// Serve `GET /health` on an already-bound listener until the task is dropped.
pub async fn serve_on(listener: TcpListener, status: StatusHandle) -> Result<()> {
    axum::serve(listener, router(status))
        .await
        .context("health server shutdown")
}

pub async fn serve(port: u16, status: StatusHandle) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(port, "health_server_started");
    serve_on(listener, status).await
}
