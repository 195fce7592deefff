use axum::{
    body::to_bytes,
    extract::Query,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::accounting::{resolve_root, resolve_tail, NodeKind};
use crate::middleware::{InternalRedirect, RequestContext};

use super::{AppError, Traced};

/// Largest sub-request body copied into an include response.
const MAX_INCLUDE_BYTES: usize = 1024 * 1024;

fn require_api_path(uri: &str) -> Result<(), AppError> {
    if uri.starts_with("/api/") {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "internal target must start with /api/, got '{uri}'"
        )))
    }
}

// ─── GET /api/chain/redirect ─────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RedirectParams {
    pub to: String,
}

/// Hands the transaction over to `to` as an internal redirect.
pub async fn redirect(Query(params): Query<RedirectParams>) -> Result<Response, AppError> {
    require_api_path(&params.to)?;
    Ok(InternalRedirect::to(params.to).into_response())
}

// ─── GET /api/chain/include ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IncludeParams {
    pub uri: String,
}

#[derive(Debug, Serialize)]
pub struct IncludeResult {
    pub uri: String,
    pub status: u16,
    pub body: serde_json::Value,
}

/// Serves `uri` as a sub-request and embeds its response.
pub async fn include(
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<IncludeParams>,
) -> Result<Json<Traced<IncludeResult>>, AppError> {
    require_api_path(&params.uri)?;

    let response = ctx.subrequest(&params.uri).await;
    let status = response.status().as_u16();
    let bytes = to_bytes(response.into_body(), MAX_INCLUDE_BYTES)
        .await
        .map_err(|e| AppError::Internal(format!("sub-request body: {e}")))?;
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()));

    Ok(Json(Traced::new(
        &ctx,
        IncludeResult {
            uri: params.uri,
            status,
            body,
        },
    )))
}

// ─── GET /api/chain/info ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NodeView {
    pub id: String,
    pub kind: &'static str,
    pub uri: String,
}

#[derive(Debug, Serialize)]
pub struct ChainView {
    pub root: String,
    pub tail: String,
    pub nodes: Vec<NodeView>,
}

/// Describes the request chain as it stands while this request runs.
pub async fn info(Extension(ctx): Extension<RequestContext>) -> Json<Traced<ChainView>> {
    let view = ctx.with_transaction(|txn| ChainView {
        root: resolve_root(txn, ctx.request_id()).to_string(),
        tail: resolve_tail(txn, ctx.request_id()).to_string(),
        nodes: txn
            .chain()
            .iter()
            .map(|(id, node)| NodeView {
                id: id.to_string(),
                kind: match node.kind {
                    NodeKind::Initial => "initial",
                    NodeKind::Redirect => "redirect",
                    NodeKind::SubRequest => "subrequest",
                },
                uri: node.uri.clone(),
            })
            .collect(),
    });

    Json(Traced::new(&ctx, view))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_api_paths_are_internal_targets() {
        assert!(require_api_path("/api/work/cpu").is_ok());
        assert!(matches!(
            require_api_path("https://example.com/"),
            Err(AppError::BadRequest(_))
        ));
        assert!(require_api_path("/static/index.html").is_err());
    }
}
