use axum::{
    extract::{Query, State},
    Extension, Json,
};
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::middleware::RequestContext;
use crate::AppState;

use super::{AppError, Traced};

// ─── GET /api/work/cpu ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CpuParams {
    #[serde(default = "default_iterations")]
    pub iterations: u64,
}

fn default_iterations() -> u64 {
    1_000_000
}

#[derive(Debug, Serialize)]
pub struct CpuResult {
    pub iterations: u64,
    pub checksum: u64,
}

/// Burns user CPU time on the blocking pool.
pub async fn cpu(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<CpuParams>,
) -> Result<Json<Traced<CpuResult>>, AppError> {
    if params.iterations > state.work.max_iterations {
        return Err(AppError::BadRequest(format!(
            "iterations must be at most {}",
            state.work.max_iterations
        )));
    }

    let iterations = params.iterations;
    let checksum = tokio::task::spawn_blocking(move || spin(iterations))
        .await
        .map_err(|e| AppError::Internal(format!("cpu task failed: {e}")))?;

    Ok(Json(Traced::new(
        &ctx,
        CpuResult {
            iterations,
            checksum,
        },
    )))
}

/// xorshift loop the optimizer cannot fold away.
fn spin(iterations: u64) -> u64 {
    let mut x = 0x9E37_79B9_7F4A_7C15u64;
    for _ in 0..iterations {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        x = std::hint::black_box(x);
    }
    x
}

// ─── POST /api/work/io ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IoParams {
    #[serde(default = "default_bytes")]
    pub bytes: u64,
}

fn default_bytes() -> u64 {
    1024 * 1024
}

#[derive(Debug, Serialize)]
pub struct IoResult {
    pub bytes_written: u64,
}

/// Writes and syncs a scratch file so output blocks get charged.
pub async fn io(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<IoParams>,
) -> Result<Json<Traced<IoResult>>, AppError> {
    if params.bytes > state.work.max_io_bytes {
        return Err(AppError::BadRequest(format!(
            "bytes must be at most {}",
            state.work.max_io_bytes
        )));
    }

    let path = state
        .work
        .scratch_dir
        .join(format!("acc-{}.tmp", uuid::Uuid::new_v4()));

    let result = write_scratch(&path, params.bytes).await;
    // Remove even when the write failed halfway.
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::debug!(path = %path.display(), error = %e, "scratch file not removed");
    }
    result?;

    Ok(Json(Traced::new(
        &ctx,
        IoResult {
            bytes_written: params.bytes,
        },
    )))
}

async fn write_scratch(path: &std::path::Path, bytes: u64) -> std::io::Result<()> {
    const CHUNK: usize = 64 * 1024;
    let chunk = vec![0xA5u8; CHUNK];

    let mut file = tokio::fs::File::create(path).await?;
    let mut left = bytes;
    while left > 0 {
        let n = left.min(CHUNK as u64) as usize;
        file.write_all(&chunk[..n]).await?;
        left -= n as u64;
    }
    file.sync_all().await
}

// ─── GET /api/work/spawn ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SpawnParams {
    #[serde(default = "default_children")]
    pub children: u32,
}

fn default_children() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct SpawnResult {
    pub children: u32,
    pub succeeded: u32,
    /// Children collected by someone else before we could wait on them.
    pub reaped_elsewhere: u32,
}

/// Runs short-lived child processes so children's counters move.
pub async fn spawn(
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<SpawnParams>,
) -> Result<Json<Traced<SpawnResult>>, AppError> {
    if params.children == 0 || params.children > 64 {
        return Err(AppError::BadRequest(
            "children must be between 1 and 64".into(),
        ));
    }

    let mut succeeded = 0;
    let mut reaped_elsewhere = 0;
    for _ in 0..params.children {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(":")
            .spawn()?;
        match wait_child(&mut child).await? {
            Some(status) if status.success() => succeeded += 1,
            Some(_) => {}
            None => reaped_elsewhere += 1,
        }
    }

    Ok(Json(Traced::new(
        &ctx,
        SpawnResult {
            children: params.children,
            succeeded,
            reaped_elsewhere,
        },
    )))
}

/// Wait for `child`. `None` when the child was already collected by the
/// accountant's non-blocking reap at the end of another transaction; its
/// usage is in the children's counters all the same.
async fn wait_child(
    child: &mut tokio::process::Child,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    match child.wait().await {
        Ok(status) => Ok(Some(status)),
        Err(e) if e.raw_os_error() == Some(Errno::ECHILD as i32) => {
            tracing::debug!(pid = ?child.id(), "child reaped elsewhere");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
