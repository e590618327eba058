//! Price-to-beat resolution.
//!
//! Resolution walks a fixed list of resolvers, highest tier first; the
//! first one with a value wins and its tier is recorded:
//! 1. independent historical candle at round open
//! 2. exchange kline at round open
//! 3. last live tick before round open
//! 4. the round's opening tick
//!
//! Tiers 1 and 2 come from network fetches that report back over a
//! channel. While one is still in flight the round is not resolved, so a
//! late tier 1 answer is never shadowed by a tier 3 tick.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info};
use updown_core::{Price, PriceToBeat, PriceToBeatTier};
use updown_telemetry::Metrics;

/// Candidate values per tier for one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriceToBeatInputs {
    pub historical_candle: Option<Price>,
    pub exchange_kline: Option<Price>,
    pub last_tick_before_open: Option<Price>,
    pub opening_tick: Option<Price>,
}

impl PriceToBeatInputs {
    pub fn set(&mut self, tier: PriceToBeatTier, price: Price) {
        let slot = match tier {
            PriceToBeatTier::HistoricalCandle => &mut self.historical_candle,
            PriceToBeatTier::ExchangeKline => &mut self.exchange_kline,
            PriceToBeatTier::LastTickBeforeOpen => &mut self.last_tick_before_open,
            PriceToBeatTier::OpeningTick => &mut self.opening_tick,
        };
        *slot = Some(price);
    }
}

type Resolver = fn(&PriceToBeatInputs) -> Option<Price>;

fn historical_candle(i: &PriceToBeatInputs) -> Option<Price> {
    i.historical_candle
}

fn exchange_kline(i: &PriceToBeatInputs) -> Option<Price> {
    i.exchange_kline
}

fn last_tick_before_open(i: &PriceToBeatInputs) -> Option<Price> {
    i.last_tick_before_open
}

fn opening_tick(i: &PriceToBeatInputs) -> Option<Price> {
    i.opening_tick
}

const RESOLVERS: [(PriceToBeatTier, Resolver); 4] = [
    (PriceToBeatTier::HistoricalCandle, historical_candle),
    (PriceToBeatTier::ExchangeKline, exchange_kline),
    (PriceToBeatTier::LastTickBeforeOpen, last_tick_before_open),
    (PriceToBeatTier::OpeningTick, opening_tick),
];

/// First available tier wins. Non-positive prices are skipped.
pub fn resolve_price_to_beat(inputs: &PriceToBeatInputs, now_ms: i64) -> Option<PriceToBeat> {
    RESOLVERS.iter().find_map(|(tier, resolver)| {
        resolver(inputs)
            .filter(Price::is_positive)
            .map(|value| PriceToBeat {
                value,
                source_rank: *tier,
                resolved_at_ms: now_ms,
            })
    })
}

/// Outcome of a tier 1 or 2 fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceReport {
    pub round_id: u64,
    pub tier: PriceToBeatTier,
    /// `None` when the fetch failed or the source had no data.
    pub price: Option<Price>,
}

/// Sending half handed to spawned fetch tasks.
pub type ReferenceSender = mpsc::UnboundedSender<ReferenceReport>;

#[derive(Debug, Default)]
struct RoundReference {
    inputs: PriceToBeatInputs,
    pending: HashSet<PriceToBeatTier>,
    resolved: Option<PriceToBeat>,
}

/// Per-round price-to-beat candidates and the immutable resolved value.
#[derive(Debug)]
pub struct PriceToBeatBook {
    rounds: DashMap<u64, RoundReference>,
    tx: ReferenceSender,
    rx: parking_lot::Mutex<mpsc::UnboundedReceiver<ReferenceReport>>,
}

impl Default for PriceToBeatBook {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceToBeatBook {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rounds: DashMap::new(),
            tx,
            rx: parking_lot::Mutex::new(rx),
        }
    }

    /// Mark a remote fetch as in flight and return the sender its task
    /// reports on.
    pub fn expect(&self, round_id: u64, tier: PriceToBeatTier) -> ReferenceSender {
        self.rounds.entry(round_id).or_default().pending.insert(tier);
        self.tx.clone()
    }

    /// Record a locally known candidate (tiers 3 and 4).
    pub fn record(&self, round_id: u64, tier: PriceToBeatTier, price: Price) {
        let mut round = self.rounds.entry(round_id).or_default();
        if round.resolved.is_none() {
            round.inputs.set(tier, price);
        }
    }

    /// Apply every report received so far.
    pub fn drain_reports(&self) -> usize {
        let mut rx = self.rx.lock();
        let mut applied = 0;
        while let Ok(report) = rx.try_recv() {
            self.apply(report);
            applied += 1;
        }
        applied
    }

    fn apply(&self, report: ReferenceReport) {
        let mut round = self.rounds.entry(report.round_id).or_default();
        round.pending.remove(&report.tier);
        match report.price {
            Some(price) if round.resolved.is_none() => {
                debug!(round_id = report.round_id, tier = %report.tier, %price, "Reference price received");
                round.inputs.set(report.tier, price);
            }
            Some(_) => {}
            None => debug!(round_id = report.round_id, tier = %report.tier, "Reference fetch returned nothing"),
        }
    }

    /// Whether remote fetches are still outstanding for a round.
    pub fn has_pending(&self, round_id: u64) -> bool {
        self.rounds
            .get(&round_id)
            .is_some_and(|r| !r.pending.is_empty())
    }

    /// Resolve once. Later calls return the first result unchanged.
    ///
    /// With `force` unset the call defers while fetches are pending.
    pub fn resolve(&self, round_id: u64, now_ms: i64, force: bool) -> Option<PriceToBeat> {
        let mut round = self.rounds.entry(round_id).or_default();
        if let Some(resolved) = round.resolved {
            return Some(resolved);
        }
        if !force && !round.pending.is_empty() {
            return None;
        }
        let resolved = resolve_price_to_beat(&round.inputs, now_ms)?;
        round.resolved = Some(resolved);
        Metrics::price_to_beat_resolved(&resolved.source_rank.rank().to_string());
        info!(
            round_id,
            value = %resolved.value,
            tier = %resolved.source_rank,
            "Price to beat resolved"
        );
        Some(resolved)
    }

    pub fn resolved(&self, round_id: u64) -> Option<PriceToBeat> {
        self.rounds.get(&round_id).and_then(|r| r.resolved)
    }

    pub fn inputs(&self, round_id: u64) -> PriceToBeatInputs {
        self.rounds
            .get(&round_id)
            .map(|r| r.inputs.clone())
            .unwrap_or_default()
    }

    /// Drop rounds older than `oldest_kept`.
    pub fn prune(&self, oldest_kept: u64) {
        self.rounds.retain(|id, _| *id >= oldest_kept);
    }
}
