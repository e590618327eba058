//! Per-source feed freshness.
//!
//! Records the local receive time of the last accepted tick per source.
//! Staleness is judged against the caller's clock so the evaluation loop
//! and tests share one notion of "now".

use dashmap::DashMap;
use std::time::Duration;
use updown_core::FeedSource;

/// Last-seen tracker shared between feed tasks and the evaluation loop.
#[derive(Debug, Default)]
pub struct FeedFreshness {
    last_seen_ms: DashMap<FeedSource, i64>,
}

impl FeedFreshness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick received from `source` at `now_ms`.
    ///
    /// Out-of-order records never move `last_seen_at` backwards.
    pub fn record(&self, source: FeedSource, now_ms: i64) {
        self.last_seen_ms
            .entry(source)
            .and_modify(|ts| *ts = (*ts).max(now_ms))
            .or_insert(now_ms);
    }

    /// Last receive time for `source` (Unix ms).
    pub fn last_seen_at(&self, source: FeedSource) -> Option<i64> {
        self.last_seen_ms.get(&source).map(|ts| *ts)
    }

    /// A source that has never produced a tick is stale.
    pub fn is_stale(&self, source: FeedSource, max_age: Duration, now_ms: i64) -> bool {
        match self.last_seen_at(source) {
            Some(ts) => now_ms.saturating_sub(ts) > max_age.as_millis() as i64,
            None => true,
        }
    }

    /// Age of the last tick per source, for status reporting.
    pub fn ages_ms(&self, now_ms: i64) -> Vec<(FeedSource, i64)> {
        let mut ages: Vec<_> = self
            .last_seen_ms
            .iter()
            .map(|entry| (*entry.key(), now_ms.saturating_sub(*entry.value())))
            .collect();
        ages.sort_by_key(|(source, _)| *source);
        ages
    }
}
