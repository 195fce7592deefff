use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::Layer;
use tower_http::cors::CorsLayer;

use crate::accounting::Accountant;
use crate::config::AccountingConfig;
use crate::handlers;
use crate::middleware::accounting::{AccountingLayer, AccountingService};
use crate::AppState;

/// Builds the Axum `Router` with all routes and per-route middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Work generators ─────────────────────────────────────
        .route("/api/work/cpu", get(handlers::work::cpu))
        .route("/api/work/io", post(handlers::work::io))
        .route("/api/work/spawn", get(handlers::work::spawn))
        // ── Request chain ───────────────────────────────────────
        .route("/api/chain/redirect", get(handlers::chain::redirect))
        .route("/api/chain/include", get(handlers::chain::include))
        .route("/api/chain/info", get(handlers::chain::info))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(CorsLayer::permissive())
}

/// Wraps the router in the accounting host layer.
///
/// The layer has to sit outside the `Router` so internal redirects and
/// sub-requests go through routing again.
pub fn create_app(
    state: Arc<AppState>,
    accountant: Arc<Accountant>,
    config: AccountingConfig,
) -> AccountingService<Router> {
    AccountingLayer::new(accountant, config).layer(create_router(state))
}
