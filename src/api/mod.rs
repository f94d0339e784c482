//! Read-only REST API over the latest community ranking.
//!
//! Endpoints:
//! - `/communities` ranked communities of the latest run
//! - `/communities/{id}` one community by cluster label
//! - `/participants` participants with cluster labels
//! - `/status` scheduler state of the tenant

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::jobs::BatchScheduler;

pub use types::{CommunitiesResponse, ErrorResponse, ParticipantQuery};

/// State shared across request handlers.
///
/// Handlers read the scheduler's published snapshot, so a run finishing
/// mid-request never yields a half-updated ranking.
pub struct AppState {
    pub scheduler: BatchScheduler,
    /// Tenant whose snapshots are served.
    pub tenant: String,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/communities", get(handlers::list_communities))
        .route("/communities/{id}", get(handlers::get_community))
        .route("/participants", get(handlers::list_participants))
        .route("/status", get(handlers::get_status))
        .with_state(state)
}

/// Binds to `addr` and serves the API until the server stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
