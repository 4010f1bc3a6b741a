use thiserror::Error;

use super::metric::MetricKey;
use super::probe::Timeval;
use super::snapshot::Snapshot;

/// An end measurement that lies before its begin measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("time travelling: begin({begin}) end({end})")]
    TimeTravel { begin: Timeval, end: Timeval },

    #[error("negative block count: begin({begin} blocks) end({end} blocks)")]
    NegativeBlockCount { begin: i64, end: i64 },
}

/// Microseconds elapsed between `begin` and `end`.
pub fn time_delta(begin: Timeval, end: Timeval) -> Result<i64, Anomaly> {
    if end < begin {
        return Err(Anomaly::TimeTravel { begin, end });
    }
    Ok((end.sec - begin.sec) * 1_000_000 + (end.usec - begin.usec))
}

/// Growth of a monotonic block counter.
pub fn block_delta(begin: i64, end: i64) -> Result<i64, Anomaly> {
    if begin > end {
        return Err(Anomaly::NegativeBlockCount { begin, end });
    }
    Ok(end - begin)
}

/// Delta of `metric` between two snapshots.
pub fn measure(metric: MetricKey, begin: &Snapshot, end: &Snapshot) -> Result<i64, Anomaly> {
    let delta = match metric {
        MetricKey::Time => time_delta(begin.wall, end.wall),
        MetricKey::UserTime => time_delta(begin.own.user_time, end.own.user_time),
        MetricKey::SystemTime => time_delta(begin.own.system_time, end.own.system_time),
        MetricKey::InBlocks => block_delta(begin.own.in_blocks, end.own.in_blocks),
        MetricKey::OutBlocks => block_delta(begin.own.out_blocks, end.own.out_blocks),
        MetricKey::ChildUserTime => {
            time_delta(begin.children.user_time, end.children.user_time)
        }
        MetricKey::ChildSystemTime => {
            time_delta(begin.children.system_time, end.children.system_time)
        }
        MetricKey::ChildInBlocks => {
            block_delta(begin.children.in_blocks, end.children.in_blocks)
        }
        MetricKey::ChildOutBlocks => {
            block_delta(begin.children.out_blocks, end.children.out_blocks)
        }
    };
    if let Ok(value) = delta {
        tracing::trace!(%metric, value, "computed delta");
    }
    delta
}

/// Publishable value for a computed delta: anomalies are logged and
/// clamped to zero.
pub fn settle(metric: MetricKey, delta: Result<i64, Anomaly>) -> i64 {
    delta.unwrap_or_else(|anomaly| {
        tracing::error!(%metric, "{anomaly}");
        0
    })
}
