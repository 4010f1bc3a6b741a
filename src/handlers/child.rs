use axum::{extract::Path, Json};
use serde::Serialize;
use tokio::process::Command;

use super::AppError;

const MAX_CHILDREN: u32 = 64;

#[derive(Debug, Serialize)]
pub struct ChildResult {
    pub spawned: u32,
    pub succeeded: u32,
    /// Children whose exit status was collected by someone else, e.g. the
    /// accounting reap of a concurrent request.
    pub unobserved: u32,
}

// ─── GET /api/child/:count ───────────────────────────────────────

/// Runs `count` short-lived child processes one after another, so their
/// usage shows up in the children counters.
pub async fn spawn_children(Path(count): Path<u32>) -> Result<Json<ChildResult>, AppError> {
    if count > MAX_CHILDREN {
        return Err(AppError::BadRequest(format!(
            "count must be at most {MAX_CHILDREN}"
        )));
    }

    let mut result = ChildResult {
        spawned: 0,
        succeeded: 0,
        unobserved: 0,
    };
    for _ in 0..count {
        let mut child = Command::new("true")
            .spawn()
            .map_err(|e| AppError::Internal(format!("spawn failed: {e}")))?;
        result.spawned += 1;

        match child.wait().await {
            Ok(status) if status.success() => result.succeeded += 1,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(%err, "child exit status not observed");
                result.unobserved += 1;
            }
        }
    }

    Ok(Json(result))
}
