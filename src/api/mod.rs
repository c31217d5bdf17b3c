//! REST API over a finished steering run.
//!
//! Provides three GET endpoints:
//! - `/state`: backend, horizon, report, and latest round
//! - `/rounds`: round log with optional range filtering
//! - `/profile`: per-interval target, aggregate, and base load
//!
//! Only aggregate data is served; individual device profiles never leave
//! the devices.

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::scenario::RunOutcome;

/// Immutable application state shared across all request handlers.
///
/// Constructed once after the run completes and wrapped in `Arc`; no locks
/// are needed since all data is read-only.
pub struct AppState {
    pub outcome: RunOutcome,
}

impl From<RunOutcome> for AppState {
    fn from(outcome: RunOutcome) -> Self {
        Self { outcome }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/rounds", get(handlers::get_rounds))
        .route("/profile", get(handlers::get_profile))
        .with_state(state)
}

/// Binds to the given address and serves the API.
///
/// # Panics
///
/// Panics if the TCP listener cannot bind to `addr`.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {addr}: {e}"));
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| panic!("server error: {e}"));
}
