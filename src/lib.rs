//! Per-transaction CPU, I/O and wall-clock accounting for HTTP services.
//!
//! [`accounting`] is the host-agnostic core; [`middleware`] plugs it into an
//! axum `Router` as a tower layer.

pub mod accounting;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod telemetry;

use config::WorkConfig;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Limits and scratch location for the work endpoints.
    pub work: WorkConfig,
}
