pub mod collector;
pub mod percentiles;
pub mod stream;

pub use collector::{MetricsCollector, MetricsSnapshot};

use crate::accounting::ChainUsage;

/// One accounted transaction, pushed by the accounting middleware.
#[derive(Debug, Clone)]
pub struct Sample {
    /// e.g. "GET /api/work/1000"
    pub endpoint: String,
    /// Final HTTP status of the chain
    pub status: u16,
    /// Internal redirects followed after the first request
    pub hops: u32,
    /// Published deltas; `None` when the chain had no begin snapshot
    pub usage: Option<ChainUsage>,
    /// Metrics clamped to zero because a counter went backwards
    pub anomalies: u32,
}
