use axum::{
    extract::Path,
    http::Uri,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;

use super::AppError;
use crate::middleware::InternalRedirect;

#[derive(Debug, Serialize)]
pub struct Arrived {
    pub arrived: bool,
}

// ─── GET /api/redirect/:hops ─────────────────────────────────────

/// Internally redirects to `/api/redirect/{hops - 1}` until `hops` is zero.
pub async fn redirect_hops(Path(hops): Path<u32>) -> Result<Response, AppError> {
    if hops == 0 {
        return Ok(Json(Arrived { arrived: true }).into_response());
    }

    let location: Uri = format!("/api/redirect/{}", hops - 1)
        .parse()
        .map_err(|e| AppError::Internal(format!("bad redirect target: {e}")))?;

    Ok(Extension(InternalRedirect(location)).into_response())
}
