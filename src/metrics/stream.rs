use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::MetricsSnapshot;
use crate::AppState;

/// Dashboard refresh period.
const STREAM_TICK: Duration = Duration::from_millis(500);

// ─── GET /api/metrics ────────────────────────────────────────────

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

// ─── POST /api/metrics/reset ─────────────────────────────────────

pub async fn reset_metrics(State(state): State<Arc<AppState>>) -> StatusCode {
    state.metrics.reset();
    tracing::info!("metrics reset");
    StatusCode::NO_CONTENT
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint: a full `MetricsSnapshot` as JSON on
/// every tick.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(STREAM_TICK);

    let stream = IntervalStream::new(interval).map(move |_| {
        match Event::default().json_data(state.metrics.snapshot()) {
            Ok(event) => Ok(event),
            Err(err) => {
                tracing::warn!(%err, "failed to encode metrics snapshot");
                Ok(Event::default().comment("encoding error"))
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
