use std::collections::HashMap;

use serde::Serialize;

use super::chain::{resolve_first, RequestId, RequestTree};
use super::probe::{Timeval, Usage, UsageProbe};

/// Resource counters captured at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub wall: Timeval,
    pub own: Usage,
    pub children: Usage,
}

impl Snapshot {
    /// Query every counter from `probe`.
    ///
    /// A failed query is logged and leaves its part of the snapshot zeroed;
    /// capturing never fails.
    pub fn capture<P: UsageProbe + ?Sized>(probe: &P, phase: &str) -> Self {
        let mut snapshot = Self::default();

        match probe.wall_clock() {
            Ok(wall) => snapshot.wall = wall,
            Err(err) => tracing::error!(phase, "{err}"),
        }
        match probe.self_usage() {
            Ok(own) => snapshot.own = own,
            Err(err) => tracing::error!(phase, "{err}"),
        }
        match probe.children_usage() {
            Ok(children) => snapshot.children = children,
            Err(err) => tracing::error!(phase, "{err}"),
        }

        tracing::debug!(
            phase,
            wall = %snapshot.wall,
            utime = %snapshot.own.user_time,
            stime = %snapshot.own.system_time,
            inblock = snapshot.own.in_blocks,
            oublock = snapshot.own.out_blocks,
            cutime = %snapshot.children.user_time,
            cstime = %snapshot.children.system_time,
            cinblock = snapshot.children.in_blocks,
            coublock = snapshot.children.out_blocks,
            "captured snapshot"
        );
        snapshot
    }
}

/// Result of [`SnapshotStore::start_accounting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The chain already has its begin snapshot.
    AlreadyStarted,
}

/// Begin snapshots keyed by the canonical first node of their chain.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    begins: HashMap<RequestId, Snapshot>,
}

impl SnapshotStore {
    /// Record the begin snapshot for the chain of `node`, once.
    pub fn start_accounting<P: UsageProbe + ?Sized>(
        &mut self,
        tree: &RequestTree,
        node: RequestId,
        probe: &P,
    ) -> StartOutcome {
        let first = resolve_first(tree, node);
        if self.begins.contains_key(&first) {
            tracing::debug!(?first, "begin snapshot already present");
            return StartOutcome::AlreadyStarted;
        }

        self.begins.insert(first, Snapshot::capture(probe, "begin"));
        StartOutcome::Started
    }

    /// Begin snapshot of the chain of `node`, if one was recorded.
    pub fn fetch(&self, tree: &RequestTree, node: RequestId) -> Option<&Snapshot> {
        self.begins.get(&resolve_first(tree, node))
    }

    pub fn len(&self) -> usize {
        self.begins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.begins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::probe::testing::ScriptedProbe;

    fn at(sec: i64) -> Snapshot {
        Snapshot {
            wall: Timeval::new(sec, 0),
            ..Snapshot::default()
        }
    }

    #[test]
    fn start_is_idempotent_per_chain() {
        let (mut tree, a) = RequestTree::new("/a");
        let b = tree.internal_redirect(a, "/b");
        let probe = ScriptedProbe::new([at(10), at(20)]);
        let mut store = SnapshotStore::default();

        assert_eq!(store.start_accounting(&tree, a, &probe), StartOutcome::Started);
        assert_eq!(
            store.start_accounting(&tree, b, &probe),
            StartOutcome::AlreadyStarted
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.fetch(&tree, b).unwrap().wall, Timeval::new(10, 0));
    }

    #[test]
    fn snapshot_is_keyed_to_first_node() {
        let (mut tree, a) = RequestTree::new("/a");
        let b = tree.internal_redirect(a, "/b");
        let c = tree.internal_redirect(b, "/c");
        let probe = ScriptedProbe::new([at(7)]);
        let mut store = SnapshotStore::default();

        store.start_accounting(&tree, c, &probe);
        assert!(store.begins.contains_key(&a));
        assert!(store.fetch(&tree, a).is_some());
    }

    #[test]
    fn fetch_without_start_is_missing() {
        let (tree, a) = RequestTree::new("/a");
        let store = SnapshotStore::default();
        assert!(store.fetch(&tree, a).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn failed_query_leaves_zeroed_fields() {
        let mut begin = at(5);
        begin.own.in_blocks = 12;
        begin.children.out_blocks = 3;
        let probe = ScriptedProbe::new([begin]);
        probe.fail_self.set(true);

        let snapshot = Snapshot::capture(&probe, "begin");
        assert_eq!(snapshot.wall, Timeval::new(5, 0));
        assert_eq!(snapshot.own, Usage::default());
        assert_eq!(snapshot.children.out_blocks, 3);
    }

    #[test]
    fn failed_clock_leaves_wall_zeroed() {
        let mut begin = at(5);
        begin.own.in_blocks = 12;
        let probe = ScriptedProbe::new([begin]);
        probe.fail_wall.set(true);

        let snapshot = Snapshot::capture(&probe, "end");
        assert_eq!(snapshot.wall, Timeval::default());
        assert_eq!(snapshot.own.in_blocks, 12);
    }

    #[test]
    fn failed_children_query_leaves_children_zeroed() {
        let mut begin = at(5);
        begin.own.out_blocks = 4;
        begin.children.in_blocks = 9;
        let probe = ScriptedProbe::new([begin]);
        probe.fail_children.set(true);

        let snapshot = Snapshot::capture(&probe, "begin");
        assert_eq!(snapshot.wall, Timeval::new(5, 0));
        assert_eq!(snapshot.own.out_blocks, 4);
        assert_eq!(snapshot.children, Usage::default());
    }
}
