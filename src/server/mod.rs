//! HTTP server
//!
//! Routes:
//! - `POST /remove-bg`: remove the background of an inline or remote image
//! - `GET /health`: model readiness
//! - `GET /models`: model catalog

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use crate::error::{BgRemovalError, Result};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// Serve until Ctrl+C or SIGTERM
///
/// # Errors
/// - Accept loop failures
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    serve_with_shutdown(listener, state, shutdown_signal()).await
}

/// Serve until `shutdown` resolves, then drain in-flight requests
///
/// # Errors
/// - Accept loop failures
pub async fn serve_with_shutdown<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{addr}");
    }

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| BgRemovalError::internal(format!("Server error: {e}")))?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Received shutdown signal");
}
