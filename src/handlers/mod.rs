pub mod chain;
pub mod work;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::middleware::RequestContext;

// ─── Shared response envelope ────────────────────────────────────

/// Every API response names the transaction and chain node that produced
/// it, so a client can match it against the access log.
#[derive(Debug, Clone, Serialize)]
pub struct Traced<T: Serialize> {
    pub data: T,
    pub transaction: String,
    /// Chain node that served this response, e.g. "#2"
    pub request: String,
}

impl<T: Serialize> Traced<T> {
    pub fn new(ctx: &RequestContext, data: T) -> Self {
        Self {
            data,
            transaction: ctx.transaction_id().to_string(),
            request: ctx.request_id().to_string(),
        }
    }
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Io(std::io::Error),
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("I/O: {e}")),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
