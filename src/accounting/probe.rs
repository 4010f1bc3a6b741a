use std::fmt;

use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeVal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::time::{clock_gettime, ClockId};
use nix::unistd::Pid;
use serde::Serialize;
use thiserror::Error;

// ─── Values ──────────────────────────────────────────────────────

/// A point in time (or an accumulated CPU time) split into whole seconds
/// and microseconds.
///
/// The derived ordering compares `sec` first and uses `usec` as the
/// tiebreak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Timeval {
    pub sec: i64,
    pub usec: i64,
}

impl Timeval {
    pub const fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }
}

impl From<TimeVal> for Timeval {
    fn from(tv: TimeVal) -> Self {
        Self {
            sec: tv.tv_sec() as i64,
            usec: tv.tv_usec() as i64,
        }
    }
}

impl fmt::Display for Timeval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}sec.", self.sec, self.usec)
    }
}

/// The four rusage fields the accounting cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub user_time: Timeval,
    pub system_time: Timeval,
    pub in_blocks: i64,
    pub out_blocks: i64,
}

impl From<nix::sys::resource::Usage> for Usage {
    fn from(usage: nix::sys::resource::Usage) -> Self {
        Self {
            user_time: usage.user_time().into(),
            system_time: usage.system_time().into(),
            in_blocks: usage.block_reads() as i64,
            out_blocks: usage.block_writes() as i64,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request for {what} failed: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: nix::Error,
    },
}

// ─── Probe ───────────────────────────────────────────────────────

/// Source of wall-clock time and process resource usage.
///
/// Counters are process-global: under concurrent load a delta also
/// contains the work of every other request running in this process.
pub trait UsageProbe {
    fn wall_clock(&self) -> Result<Timeval, ProbeError>;

    fn self_usage(&self) -> Result<Usage, ProbeError>;

    /// Usage accumulated by terminated (and waited-for) children.
    fn children_usage(&self) -> Result<Usage, ProbeError>;

    /// Collect any exited child without blocking.
    fn reap_children(&self);
}

/// [`UsageProbe`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl UsageProbe for SystemProbe {
    fn wall_clock(&self) -> Result<Timeval, ProbeError> {
        let now = clock_gettime(ClockId::CLOCK_REALTIME).map_err(|source| ProbeError::Query {
            what: "time of day",
            source,
        })?;
        Ok(Timeval::new(
            now.tv_sec() as i64,
            now.tv_nsec() as i64 / 1_000,
        ))
    }

    fn self_usage(&self) -> Result<Usage, ProbeError> {
        getrusage(UsageWho::RUSAGE_SELF)
            .map(Usage::from)
            .map_err(|source| ProbeError::Query {
                what: "resource usage",
                source,
            })
    }

    fn children_usage(&self) -> Result<Usage, ProbeError> {
        getrusage(UsageWho::RUSAGE_CHILDREN)
            .map(Usage::from)
            .map_err(|source| ProbeError::Query {
                what: "children's resource usage",
                source,
            })
    }

    /// Waits for any child, so it can steal the exit status of a child
    /// another task is waiting on; that waiter then sees `ECHILD`.
    fn reap_children(&self) {
        match waitpid(Option::<Pid>::None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {}
            Ok(status) => tracing::trace!(?status, "reaped child"),
            // ECHILD: nothing to wait for
            Err(err) => tracing::trace!(%err, "no child reaped"),
        }
    }
}

// ─── Test double ─────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;
    use crate::accounting::snapshot::Snapshot;

    /// Replays a fixed sequence of snapshots.
    ///
    /// Every `wall_clock` call advances to the next queued snapshot, the two
    /// usage queries then report from it. Matches the query order of
    /// `Snapshot::capture`.
    pub struct ScriptedProbe {
        queue: RefCell<VecDeque<Snapshot>>,
        current: Cell<Snapshot>,
        pub fail_wall: Cell<bool>,
        pub fail_self: Cell<bool>,
        pub fail_children: Cell<bool>,
        pub reaped: Cell<u32>,
    }

    fn failure(what: &'static str) -> ProbeError {
        ProbeError::Query {
            what,
            source: nix::Error::EINVAL,
        }
    }

    impl ScriptedProbe {
        pub fn new(snapshots: impl IntoIterator<Item = Snapshot>) -> Self {
            Self {
                queue: RefCell::new(snapshots.into_iter().collect()),
                current: Cell::new(Snapshot::default()),
                fail_wall: Cell::new(false),
                fail_self: Cell::new(false),
                fail_children: Cell::new(false),
                reaped: Cell::new(0),
            }
        }
    }

    impl UsageProbe for ScriptedProbe {
        fn wall_clock(&self) -> Result<Timeval, ProbeError> {
            let next = self
                .queue
                .borrow_mut()
                .pop_front()
                .expect("probe script exhausted");
            self.current.set(next);
            if self.fail_wall.get() {
                return Err(failure("time of day"));
            }
            Ok(next.wall)
        }

        fn self_usage(&self) -> Result<Usage, ProbeError> {
            if self.fail_self.get() {
                return Err(failure("resource usage"));
            }
            Ok(self.current.get().own)
        }

        fn children_usage(&self) -> Result<Usage, ProbeError> {
            if self.fail_children.get() {
                return Err(failure("children's resource usage"));
            }
            Ok(self.current.get().children)
        }

        fn reap_children(&self) {
            self.reaped.set(self.reaped.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeval_orders_seconds_before_microseconds() {
        assert!(Timeval::new(1, 999_999) < Timeval::new(2, 0));
        assert!(Timeval::new(2, 1) > Timeval::new(2, 0));
        assert_eq!(Timeval::new(3, 5), Timeval::new(3, 5));
    }

    #[test]
    fn timeval_display_pads_microseconds() {
        assert_eq!(Timeval::new(1000, 42).to_string(), "1000.000042sec.");
    }

    #[test]
    fn system_probe_reports_plausible_values() {
        let probe = SystemProbe;
        let wall = probe.wall_clock().unwrap();
        assert!(wall.sec > 1_600_000_000);
        assert!((0..1_000_000).contains(&wall.usec));

        let own = probe.self_usage().unwrap();
        assert!(own.in_blocks >= 0 && own.out_blocks >= 0);
        assert!(probe.children_usage().is_ok());

        // nothing to reap; must return immediately
        probe.reap_children();
    }
}
