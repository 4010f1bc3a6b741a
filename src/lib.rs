//! HTTP server with per-request resource accounting.
//!
//! Every client-visible transaction is accounted as one chain, however many
//! internal redirects it goes through: wall time, user/system CPU time and
//! block I/O of the process and of its children.

pub mod accounting;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;

use accounting::{Accountant, SystemProbe};
use config::Config;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Runs the begin/end hooks of every transaction.
    pub accountant: Accountant<SystemProbe>,

    /// Aggregates accounted transactions for the dashboard.
    pub metrics: metrics::MetricsCollector,

    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            accountant: Accountant::new(SystemProbe),
            metrics: metrics::MetricsCollector::new(),
            config,
        }
    }
}
