//! AppState delivery (spec §4.7). An ordered list of `{t, p}` entries
//! attached to a single `Subscribed` reply so the client can bootstrap.
//!
//! Open question from spec §9: "`channel_subscribed` listeners can append
//! arbitrary outgoing messages ... the source does not cap size or depth."
//! Resolved in DESIGN.md: we cap both the entry count and the serialized
//! size of the collected app-state so one runaway listener can't block a
//! subscribe reply indefinitely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry count above which `AppStateCollector::push` starts rejecting new
/// entries (logged, not propagated as an error — a partial bootstrap beats
/// none).
pub const MAX_APP_STATE_ENTRIES: usize = 64;
/// Serialized byte budget for the whole collected app-state vector.
pub const MAX_APP_STATE_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppStateEntry {
    pub t: String,
    pub p: Option<Value>,
}

#[derive(Debug, Default)]
pub struct AppStateCollector {
    entries: Vec<AppStateEntry>,
    bytes: usize,
}

impl AppStateCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry; silently drops entries past the size/count budget
    /// and logs a warning, per the documented cap policy.
    pub fn push(&mut self, t: impl Into<String>, p: Option<Value>) {
        if self.entries.len() >= MAX_APP_STATE_ENTRIES {
            tracing::warn!("app_state entry dropped: MAX_APP_STATE_ENTRIES exceeded");
            return;
        }
        let entry = AppStateEntry { t: t.into(), p };
        let size = serde_json::to_vec(&entry).map(|v| v.len()).unwrap_or(0);
        if self.bytes + size > MAX_APP_STATE_BYTES {
            tracing::warn!("app_state entry dropped: MAX_APP_STATE_BYTES exceeded");
            return;
        }
        self.bytes += size;
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the collector, returning `None` when nothing was appended —
    /// the subscribe reply should carry `app_state: null` in that case
    /// (spec §8 scenario 4).
    pub fn finish(self) -> Option<Vec<AppStateEntry>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collector_finishes_to_none() {
        let collector = AppStateCollector::new();
        assert!(collector.finish().is_none());
    }

    #[test]
    fn pushed_entries_preserve_insertion_order() {
        let mut collector = AppStateCollector::new();
        collector.push("a.msg", None);
        collector.push("b.msg", Some(serde_json::json!({"x": 1})));
        let entries = collector.finish().expect("entries");
        assert_eq!(entries[0].t, "a.msg");
        assert_eq!(entries[1].t, "b.msg");
    }

    #[test]
    fn entries_beyond_the_cap_are_dropped() {
        let mut collector = AppStateCollector::new();
        for i in 0..(MAX_APP_STATE_ENTRIES + 5) {
            collector.push(format!("msg.{i}"), None);
        }
        let entries = collector.finish().expect("entries");
        assert_eq!(entries.len(), MAX_APP_STATE_ENTRIES);
    }
}
