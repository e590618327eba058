//! Bounded rolling event log with change-only dedupe.
//!
//! Material events (opportunities, odds-filter and economics blocks) are
//! appended when their identity changes or their tracked metric moves by
//! at least [`MATERIAL_MOVE_PCT`]. Discrete events (risk rejections) are
//! appended only when their identity changes. Everything else is always
//! appended.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Relative move of a material event's metric that is worth logging again.
pub const MATERIAL_MOVE_PCT: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RoundActivated,
    RoundClosed,
    Opportunity,
    OddsFilterBlock,
    EconomicsBlock,
    RiskRejection,
    PositionOpened,
    PositionSettled,
    KillSwitch,
    Feed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEntry {
    pub timestamp_ms: i64,
    pub kind: EventKind,
    pub round_id: Option<u64>,
    pub message: String,
}

impl EventEntry {
    pub fn new(timestamp_ms: i64, kind: EventKind, round_id: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            kind,
            round_id,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<EventEntry>,
    last_material: HashMap<EventKind, (String, f64)>,
    last_discrete: HashMap<EventKind, String>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
            last_material: HashMap::new(),
            last_discrete: HashMap::new(),
        }
    }

    pub fn push(&mut self, entry: EventEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Returns whether the entry was appended.
    pub fn push_material(&mut self, entry: EventEntry, identity: &str, metric: f64) -> bool {
        let changed = match self.last_material.get(&entry.kind) {
            None => true,
            Some((last_id, last_metric)) => last_id != identity || moved(*last_metric, metric),
        };
        if changed {
            self.last_material.insert(entry.kind, (identity.to_string(), metric));
            self.push(entry);
        }
        changed
    }

    /// Returns whether the entry was appended.
    pub fn push_discrete(&mut self, entry: EventEntry, identity: &str) -> bool {
        if self.last_discrete.get(&entry.kind).is_some_and(|last| last == identity) {
            return false;
        }
        self.last_discrete.insert(entry.kind, identity.to_string());
        self.push(entry);
        true
    }

    /// Forget dedupe state so the next event of each kind is logged.
    pub fn reset_dedupe(&mut self) {
        self.last_material.clear();
        self.last_discrete.clear();
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn moved(last: f64, current: f64) -> bool {
    if last == 0.0 {
        return current != 0.0;
    }
    ((current - last) / last).abs() >= MATERIAL_MOVE_PCT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: EventKind) -> EventEntry {
        EventEntry::new(0, kind, Some(1), "x")
    }

    #[test]
    fn test_bounded() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.push(EventEntry::new(i, EventKind::Feed, None, "tick"));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].timestamp_ms, 2);
    }

    #[test]
    fn test_material_dedupe() {
        let mut log = EventLog::new(10);
        assert!(log.push_material(entry(EventKind::Opportunity), "1:BUY_YES", 0.60));
        // 2% move: suppressed
        assert!(!log.push_material(entry(EventKind::Opportunity), "1:BUY_YES", 0.612));
        // 3.3% move from the last logged value
        assert!(log.push_material(entry(EventKind::Opportunity), "1:BUY_YES", 0.62));
        // identity change
        assert!(log.push_material(entry(EventKind::Opportunity), "1:BUY_NO", 0.62));
        // kinds are tracked separately
        assert!(log.push_material(entry(EventKind::EconomicsBlock), "1:BUY_NO", 0.62));
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn test_discrete_dedupe() {
        let mut log = EventLog::new(10);
        assert!(log.push_discrete(entry(EventKind::RiskRejection), "cooldown_active"));
        assert!(!log.push_discrete(entry(EventKind::RiskRejection), "cooldown_active"));
        assert!(log.push_discrete(entry(EventKind::RiskRejection), "round_trade_limit"));
        assert!(log.push_discrete(entry(EventKind::RiskRejection), "cooldown_active"));
        log.reset_dedupe();
        assert!(log.push_discrete(entry(EventKind::RiskRejection), "cooldown_active"));
        assert_eq!(log.len(), 4);
    }
}
