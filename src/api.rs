//! Liveness endpoint for the hosting platform. Shares no state with the poller.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub const ALIVE_BODY: &str = "Bot is alive!";

pub fn router() -> Router {
    Router::new()
        .route("/", get(|| async { ALIVE_BODY }))
        .layer(TraceLayer::new_for_http())
}

/// Binds `0.0.0.0:port` and serves until the task is dropped.
pub async fn serve(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding liveness server on {addr}"))?;
    tracing::info!(%addr, "liveness server listening");
    axum::serve(listener, router())
        .await
        .context("liveness server failed")
}
