use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

// ─── Metric identifiers ──────────────────────────────────────────

/// The nine quantities published for every accounted chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    /// Wall-clock duration (µs)
    Time,
    /// Own user CPU time (µs)
    UserTime,
    /// Own system CPU time (µs)
    SystemTime,
    /// Own block input operations
    InBlocks,
    /// Own block output operations
    OutBlocks,
    /// Children user CPU time (µs)
    ChildUserTime,
    /// Children system CPU time (µs)
    ChildSystemTime,
    /// Children block input operations
    ChildInBlocks,
    /// Children block output operations
    ChildOutBlocks,
}

impl MetricKey {
    /// Publication order.
    pub const ALL: [MetricKey; 9] = [
        MetricKey::Time,
        MetricKey::UserTime,
        MetricKey::SystemTime,
        MetricKey::InBlocks,
        MetricKey::OutBlocks,
        MetricKey::ChildUserTime,
        MetricKey::ChildSystemTime,
        MetricKey::ChildInBlocks,
        MetricKey::ChildOutBlocks,
    ];

    /// Key under which the value is published in a node's notes.
    pub const fn note_key(self) -> &'static str {
        match self {
            MetricKey::Time => "ACC_time",
            MetricKey::UserTime => "ACC_utime",
            MetricKey::SystemTime => "ACC_stime",
            MetricKey::InBlocks => "ACC_inblock",
            MetricKey::OutBlocks => "ACC_oublock",
            MetricKey::ChildUserTime => "ACC_cutime",
            MetricKey::ChildSystemTime => "ACC_cstime",
            MetricKey::ChildInBlocks => "ACC_cinblock",
            MetricKey::ChildOutBlocks => "ACC_coublock",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.note_key())
    }
}

// ─── Notes side-channel ──────────────────────────────────────────

/// String-keyed side-channel attached to a request node. Last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notes {
    entries: BTreeMap<String, String>,
}

impl Notes {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Published value of `key`, if present and numeric.
    pub fn metric(&self, key: MetricKey) -> Option<i64> {
        self.get(key.note_key())?.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Consumer view ───────────────────────────────────────────────

/// Published metrics of one chain, as read back by a consumer of the
/// canonical last node's notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainUsage {
    pub time_us: i64,
    pub user_us: i64,
    pub system_us: i64,
    pub in_blocks: i64,
    pub out_blocks: i64,
    pub child_user_us: i64,
    pub child_system_us: i64,
    pub child_in_blocks: i64,
    pub child_out_blocks: i64,
}

impl ChainUsage {
    /// Returns `None` unless every metric has been published.
    pub fn from_notes(notes: &Notes) -> Option<Self> {
        Some(Self {
            time_us: notes.metric(MetricKey::Time)?,
            user_us: notes.metric(MetricKey::UserTime)?,
            system_us: notes.metric(MetricKey::SystemTime)?,
            in_blocks: notes.metric(MetricKey::InBlocks)?,
            out_blocks: notes.metric(MetricKey::OutBlocks)?,
            child_user_us: notes.metric(MetricKey::ChildUserTime)?,
            child_system_us: notes.metric(MetricKey::ChildSystemTime)?,
            child_in_blocks: notes.metric(MetricKey::ChildInBlocks)?,
            child_out_blocks: notes.metric(MetricKey::ChildOutBlocks)?,
        })
    }

    pub fn get(&self, key: MetricKey) -> i64 {
        match key {
            MetricKey::Time => self.time_us,
            MetricKey::UserTime => self.user_us,
            MetricKey::SystemTime => self.system_us,
            MetricKey::InBlocks => self.in_blocks,
            MetricKey::OutBlocks => self.out_blocks,
            MetricKey::ChildUserTime => self.child_user_us,
            MetricKey::ChildSystemTime => self.child_system_us,
            MetricKey::ChildInBlocks => self.child_in_blocks,
            MetricKey::ChildOutBlocks => self.child_out_blocks,
        }
    }

    /// Children user + system CPU (µs)
    pub fn child_cpu_us(&self) -> i64 {
        self.child_user_us + self.child_system_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_keys_are_distinct() {
        let mut keys: Vec<_> = MetricKey::ALL.iter().map(|k| k.note_key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), MetricKey::ALL.len());
    }

    #[test]
    fn notes_last_write_wins() {
        let mut notes = Notes::default();
        notes.set("ACC_time", "1");
        notes.set("ACC_time", "2");
        assert_eq!(notes.get("ACC_time"), Some("2"));
        assert_eq!(notes.metric(MetricKey::Time), Some(2));
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn chain_usage_requires_every_metric() {
        let mut notes = Notes::default();
        for (i, key) in MetricKey::ALL.iter().enumerate() {
            notes.set(key.note_key(), i.to_string());
        }
        let usage = ChainUsage::from_notes(&notes).unwrap();
        for (i, key) in MetricKey::ALL.iter().enumerate() {
            assert_eq!(usage.get(*key), i as i64);
        }
        assert_eq!(usage.child_cpu_us(), 5 + 6);

        notes.set("ACC_coublock", "not a number");
        assert!(ChainUsage::from_notes(&notes).is_none());
    }
}
