//! Liveness HTTP endpoint for the hosting platform.

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const LIVENESS_TEXT: &str = "Bot is running!";

pub fn router() -> Router {
    Router::new().route("/", get(|| async { LIVENESS_TEXT }))
}

/// Serve `GET /` on all interfaces until `shutdown` is cancelled
pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Health endpoint listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
