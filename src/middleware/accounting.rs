use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::accounting::{resolve_last, ChainUsage, Transaction};
use crate::handlers::AppError;
use crate::metrics::Sample;
use crate::AppState;

/// Response extension asking the accounting layer to dispatch the
/// transaction again at another location, as a new request of the same
/// chain.
#[derive(Debug, Clone)]
pub struct InternalRedirect(pub Uri);

/// Wraps the whole router: accounts every client-visible transaction
/// across its internal redirects.
///
/// Adds these response headers when the chain could be accounted:
///
///   X-Accounting-Time-Us    wall time of the whole chain (μs)
///   X-Accounting-Utime-Us   own user CPU time (μs)
///   X-Accounting-Stime-Us   own system CPU time (μs)
///   Server-Timing           the same values in Server-Timing format
pub async fn accounting_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let path = req.uri().path().to_owned();

    let mut txn = Transaction::new(&path);
    let root = txn.root;
    state.accountant.start(&mut txn, root);

    // ── Dispatch, following internal redirects ──────────────────
    let mut current = root;
    let mut hops = 0u32;
    let mut response = next.clone().run(req).await;
    while let Some(InternalRedirect(location)) =
        response.extensions_mut().remove::<InternalRedirect>()
    {
        if hops >= state.config.max_internal_redirects {
            tracing::warn!(
                txn = %txn.id,
                %location,
                hops,
                "request exceeded the internal redirect limit"
            );
            response = AppError::Internal(format!(
                "request exceeded the limit of {} internal redirects",
                state.config.max_internal_redirects
            ))
            .into_response();
            break;
        }

        hops += 1;
        current = txn.tree.internal_redirect(current, location.path());
        state.accountant.start(&mut txn, current);
        response = next.clone().run(redirected(&method, &headers, location)).await;
    }

    // ── Publish and consume the chain's metrics ─────────────────
    let report = state.accountant.stop(&mut txn, root).ok();
    let last = resolve_last(&txn.tree, root);
    let usage = ChainUsage::from_notes(&txn.tree.node(last).notes);
    let anomalies = report.map_or(0, |r| r.anomalies.len() as u32);
    let status = response.status().as_u16();

    if let (Some(usage), false) = (&usage, state.config.no_timing_headers) {
        insert_timing_headers(response.headers_mut(), usage);
    }

    if is_instrumentation(&path) {
        return response;
    }

    match &usage {
        Some(u) => tracing::info!(
            txn = %txn.id,
            %method,
            path = %path,
            last = txn.tree.node(last).path(),
            status,
            hops,
            time_us = u.time_us,
            utime_us = u.user_us,
            stime_us = u.system_us,
            inblock = u.in_blocks,
            oublock = u.out_blocks,
            cutime_us = u.child_user_us,
            cstime_us = u.child_system_us,
            cinblock = u.child_in_blocks,
            coublock = u.child_out_blocks,
            anomalies,
            "transaction"
        ),
        None => tracing::info!(
            txn = %txn.id,
            %method,
            path = %path,
            status,
            hops,
            "transaction (unaccounted)"
        ),
    }

    state.metrics.record(Sample {
        endpoint: format!("{method} {path}"),
        status,
        hops,
        usage,
        anomalies,
    });

    response
}

/// The request re-dispatched for an internal redirect. The body was
/// consumed by the first dispatch, so the headers describing it are dropped.
fn redirected(method: &Method, headers: &HeaderMap, location: Uri) -> Request {
    let mut req = Request::new(Body::empty());
    *req.method_mut() = method.clone();
    *req.uri_mut() = location;
    *req.headers_mut() = headers.clone();
    req.headers_mut().remove(header::CONTENT_LENGTH);
    req.headers_mut().remove(header::TRANSFER_ENCODING);
    req
}

fn insert_timing_headers(headers: &mut HeaderMap, usage: &ChainUsage) {
    headers.insert("X-Accounting-Time-Us", HeaderValue::from(usage.time_us));
    headers.insert("X-Accounting-Utime-Us", HeaderValue::from(usage.user_us));
    headers.insert("X-Accounting-Stime-Us", HeaderValue::from(usage.system_us));

    let server_timing = format!(
        "total;dur={:.3}, cpu-user;dur={:.3}, cpu-sys;dur={:.3}",
        usage.time_us as f64 / 1000.0,
        usage.user_us as f64 / 1000.0,
        usage.system_us as f64 / 1000.0,
    );
    if let Ok(val) = HeaderValue::from_str(&server_timing) {
        headers.insert("Server-Timing", val);
    }
}

/// Dashboard polling is accounted but kept out of the log and the
/// aggregates.
fn is_instrumentation(path: &str) -> bool {
    path.starts_with("/api/metrics") || !path.starts_with("/api/")
}
