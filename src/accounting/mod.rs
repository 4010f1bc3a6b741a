//! Per-request resource accounting across redirect and sub-request chains.
//!
//! The begin snapshot is taken once per chain and kept for the chain's
//! canonical first node; at the end the nine deltas are published as
//! decimal text on the canonical last node's notes.

pub mod chain;
pub mod delta;
pub mod metric;
pub mod probe;
pub mod snapshot;

use thiserror::Error;
use uuid::Uuid;

pub use chain::{resolve_first, resolve_last, RequestId, RequestTree};
pub use delta::Anomaly;
pub use metric::{ChainUsage, MetricKey, Notes};
pub use probe::{SystemProbe, UsageProbe};
pub use snapshot::{Snapshot, SnapshotStore, StartOutcome};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountingError {
    #[error("failed to fetch begin snapshot for chain starting at {first:?}")]
    MissingSnapshot { first: RequestId },
}

/// All accounting state of one client-visible request.
#[derive(Debug)]
pub struct Transaction {
    pub id: Uuid,
    pub tree: RequestTree,
    /// The top-level request.
    pub root: RequestId,
    pub snapshots: SnapshotStore,
}

impl Transaction {
    pub fn new(path: &str) -> Self {
        let (tree, root) = RequestTree::new(path);
        Self {
            id: Uuid::new_v4(),
            tree,
            root,
            snapshots: SnapshotStore::default(),
        }
    }
}

/// What [`Accountant::stop`] published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub first: RequestId,
    pub last: RequestId,
    pub values: Vec<(MetricKey, i64)>,
    /// Metrics that were clamped to zero.
    pub anomalies: Vec<(MetricKey, Anomaly)>,
}

/// Runs the two lifecycle hooks against a [`UsageProbe`].
#[derive(Debug, Clone, Default)]
pub struct Accountant<P> {
    probe: P,
}

impl<P: UsageProbe> Accountant<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// A request of `txn` has begun.
    pub fn start(&self, txn: &mut Transaction, node: RequestId) -> StartOutcome {
        txn.snapshots
            .start_accounting(&txn.tree, node, &self.probe)
    }

    /// A request of `txn` is about to be logged.
    ///
    /// Publishes every metric on the chain's last node. A missing begin
    /// snapshot is logged and nothing is published.
    pub fn stop(&self, txn: &mut Transaction, node: RequestId) -> Result<Report, AccountingError> {
        let first = resolve_first(&txn.tree, node);
        let last = resolve_last(&txn.tree, node);

        let Some(begin) = txn.snapshots.fetch(&txn.tree, first).copied() else {
            let err = AccountingError::MissingSnapshot { first };
            tracing::error!(txn = %txn.id, "{err}");
            return Err(err);
        };

        self.probe.reap_children();
        let end = Snapshot::capture(&self.probe, "end");

        let mut values = Vec::with_capacity(MetricKey::ALL.len());
        let mut anomalies = Vec::new();
        let notes = &mut txn.tree.node_mut(last).notes;
        for metric in MetricKey::ALL {
            let delta = delta::measure(metric, &begin, &end);
            if let Err(anomaly) = delta {
                anomalies.push((metric, anomaly));
            }
            let value = delta::settle(metric, delta);
            notes.set(metric.note_key(), value.to_string());
            values.push((metric, value));
        }

        Ok(Report {
            first,
            last,
            values,
            anomalies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::probe::testing::ScriptedProbe;
    use super::probe::Timeval;
    use super::*;

    fn snapshot(wall: Timeval, user: Timeval, in_blocks: i64) -> Snapshot {
        let mut s = Snapshot {
            wall,
            ..Snapshot::default()
        };
        s.own.user_time = user;
        s.own.in_blocks = in_blocks;
        s
    }

    #[test]
    fn transaction_starts_at_its_top_level_request() {
        let txn = Transaction::new("/api/work/1");
        assert_eq!(txn.tree.len(), 1);
        assert_eq!(txn.tree.node(txn.root).path(), "/api/work/1");
        assert_eq!(txn.tree.node(txn.root).main(), None);
        assert!(txn.snapshots.is_empty());
    }

    #[test]
    fn publishes_durations_on_last_node() {
        let begin = snapshot(Timeval::new(1000, 0), Timeval::new(0, 500_000), 0);
        let end = snapshot(Timeval::new(1002, 250_000), Timeval::new(0, 900_000), 0);
        let accountant = Accountant::new(ScriptedProbe::new([begin, end]));

        let mut txn = Transaction::new("/");
        let root = txn.root;
        assert_eq!(accountant.start(&mut txn, root), StartOutcome::Started);
        let report = accountant.stop(&mut txn, root).unwrap();

        let notes = &txn.tree.node(report.last).notes;
        assert_eq!(notes.get("ACC_time"), Some("2250000"));
        assert_eq!(notes.get("ACC_utime"), Some("400000"));
        assert_eq!(notes.len(), MetricKey::ALL.len());
        assert!(report.anomalies.is_empty());
        assert_eq!(accountant.probe().reaped.get(), 1);
    }

    #[test]
    fn backwards_block_counter_is_clamped() {
        let begin = snapshot(Timeval::new(1, 0), Timeval::default(), 50);
        let end = snapshot(Timeval::new(2, 0), Timeval::default(), 30);
        let accountant = Accountant::new(ScriptedProbe::new([begin, end]));

        let mut txn = Transaction::new("/");
        let root = txn.root;
        accountant.start(&mut txn, root);
        let report = accountant.stop(&mut txn, root).unwrap();

        assert_eq!(
            report.anomalies,
            vec![(
                MetricKey::InBlocks,
                Anomaly::NegativeBlockCount { begin: 50, end: 30 }
            )]
        );
        let notes = &txn.tree.node(root).notes;
        assert_eq!(notes.metric(MetricKey::InBlocks), Some(0));
        assert_eq!(notes.metric(MetricKey::Time), Some(1_000_000));
    }

    #[test]
    fn redirect_chain_keys_begin_first_and_publishes_last() {
        let t = |sec| snapshot(Timeval::new(sec, 0), Timeval::default(), 0);
        let accountant = Accountant::new(ScriptedProbe::new([t(1), t(4)]));

        let mut txn = Transaction::new("/a");
        let a = txn.root;
        let b = txn.tree.internal_redirect(a, "/b");
        let c = txn.tree.internal_redirect(b, "/c");

        assert_eq!(accountant.start(&mut txn, c), StartOutcome::Started);
        assert_eq!(accountant.start(&mut txn, a), StartOutcome::AlreadyStarted);
        assert!(txn.snapshots.fetch(&txn.tree, a).is_some());

        let report = accountant.stop(&mut txn, b).unwrap();
        assert_eq!((report.first, report.last), (a, c));
        assert_eq!(txn.tree.node(c).notes.metric(MetricKey::Time), Some(3_000_000));
        assert!(txn.tree.node(a).notes.is_empty());
        assert!(txn.tree.node(b).notes.is_empty());
    }

    #[test]
    fn stop_without_start_publishes_nothing() {
        let accountant = Accountant::new(ScriptedProbe::new([]));
        let mut txn = Transaction::new("/");
        let root = txn.root;

        assert_eq!(
            accountant.stop(&mut txn, root),
            Err(AccountingError::MissingSnapshot { first: root })
        );
        assert!(txn.tree.node(root).notes.is_empty());
        assert_eq!(accountant.probe().reaped.get(), 0);
    }

    #[test]
    fn system_probe_produces_full_chain_usage() {
        let accountant = Accountant::new(SystemProbe);
        let mut txn = Transaction::new("/");
        let root = txn.root;
        accountant.start(&mut txn, root);
        let report = accountant.stop(&mut txn, root).unwrap();

        let usage = ChainUsage::from_notes(&txn.tree.node(root).notes).unwrap();
        assert!(usage.time_us >= 0);
        assert!(report.values.iter().all(|(_, v)| *v >= 0));
    }
}
