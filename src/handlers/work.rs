use axum::{extract::Path, Json};
use serde::Serialize;

use super::AppError;

/// Upper bound so a single request cannot pin a worker for minutes.
const MAX_ITERATIONS: u64 = 50_000_000;

#[derive(Debug, Serialize)]
pub struct WorkResult {
    pub iterations: u64,
    pub checksum: u64,
}

// ─── GET /api/work/:iterations ───────────────────────────────────

/// Burns user CPU time on a blocking thread.
pub async fn burn_cpu(Path(iterations): Path<u64>) -> Result<Json<WorkResult>, AppError> {
    if iterations > MAX_ITERATIONS {
        return Err(AppError::BadRequest(format!(
            "iterations must be at most {MAX_ITERATIONS}"
        )));
    }

    let checksum = tokio::task::spawn_blocking(move || checksum(iterations))
        .await
        .map_err(|e| AppError::Internal(format!("worker failed: {e}")))?;

    Ok(Json(WorkResult {
        iterations,
        checksum,
    }))
}

/// xorshift over `iterations` rounds; opaque to the optimiser.
fn checksum(iterations: u64) -> u64 {
    let mut x: u64 = 0x9E37_79B9_7F4A_7C15;
    for _ in 0..iterations {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        x = std::hint::black_box(x);
    }
    x
}
