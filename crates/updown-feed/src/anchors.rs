//! Per-round tick anchors.
//!
//! Keeps the first and last tick each source produced inside each round
//! bucket (`observed_at_ms / duration_ms`). These anchors answer the three
//! questions settlement asks of the live feed:
//! - last tick before the round opened (price-to-beat tier 3)
//! - first tick inside the round (price-to-beat tier 4)
//! - the close price, once a tick at or after the close has been seen

use std::collections::{BTreeMap, HashMap};
use updown_core::{FeedSource, Price, Round, Tick};

/// Rounds kept per source.
pub const DEFAULT_RETAINED_ROUNDS: usize = 8;

/// First and last tick observed in one round bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundAnchor {
    pub first: Tick,
    pub last: Tick,
}

impl RoundAnchor {
    fn new(tick: Tick) -> Self {
        Self {
            first: tick.clone(),
            last: tick,
        }
    }

    fn observe(&mut self, tick: &Tick) {
        if tick.observed_at_ms < self.first.observed_at_ms {
            self.first = tick.clone();
        }
        if tick.observed_at_ms >= self.last.observed_at_ms {
            self.last = tick.clone();
        }
    }
}

/// Anchor store, bucketed by round duration.
#[derive(Debug)]
pub struct RoundAnchors {
    duration_ms: i64,
    retained_rounds: usize,
    by_source: HashMap<FeedSource, BTreeMap<u64, RoundAnchor>>,
}

impl RoundAnchors {
    pub fn new(duration_secs: i64, retained_rounds: usize) -> Self {
        Self {
            duration_ms: duration_secs.max(1) * 1000,
            retained_rounds: retained_rounds.max(2),
            by_source: HashMap::new(),
        }
    }

    /// Record a tick in its round bucket.
    pub fn record(&mut self, tick: &Tick) {
        if tick.observed_at_ms < 0 {
            return;
        }
        let round_id = tick.observed_at_ms.div_euclid(self.duration_ms) as u64;
        let rounds = self.by_source.entry(tick.source).or_default();
        rounds
            .entry(round_id)
            .and_modify(|anchor| anchor.observe(tick))
            .or_insert_with(|| RoundAnchor::new(tick.clone()));

        while rounds.len() > self.retained_rounds {
            rounds.pop_first();
        }
    }

    /// Anchor for `source` in `round_id`.
    pub fn anchor(&self, source: FeedSource, round_id: u64) -> Option<&RoundAnchor> {
        self.by_source.get(&source)?.get(&round_id)
    }

    /// Latest tick observed before the round opened.
    pub fn last_tick_before_open(&self, source: FeedSource, round: &Round) -> Option<&Tick> {
        let rounds = self.by_source.get(&source)?;
        rounds
            .range(..round.round_id)
            .next_back()
            .map(|(_, anchor)| &anchor.last)
    }

    /// First tick observed inside the round.
    pub fn opening_tick(&self, source: FeedSource, round: &Round) -> Option<&Tick> {
        self.anchor(source, round.round_id).map(|anchor| &anchor.first)
    }

    /// Close price of `round` for `source`.
    ///
    /// The latest tick at or before `close_ts`. Returns `None` until the
    /// source has produced a tick at or after the close, so a late tick
    /// inside the round can never change an already resolved close.
    pub fn close_price(&self, source: FeedSource, round: &Round) -> Option<Price> {
        let rounds = self.by_source.get(&source)?;
        let close_ms = round.close_ms();

        let (_, after) = rounds.range(round.round_id + 1..).next()?;
        if after.last.observed_at_ms < close_ms {
            return None;
        }
        if after.first.observed_at_ms == close_ms {
            return Some(after.first.price);
        }
        rounds.get(&round.round_id).map(|anchor| anchor.last.price)
    }

    /// Latest tick across all retained rounds for `source`.
    pub fn latest(&self, source: FeedSource) -> Option<&Tick> {
        self.by_source
            .get(&source)?
            .last_key_value()
            .map(|(_, anchor)| &anchor.last)
    }
}
