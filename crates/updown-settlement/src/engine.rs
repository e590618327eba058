//! Settlement engine.
//!
//! Holds open positions per round. Once a round closes, each poll tries
//! to resolve its close price and price to beat; when both are known (or
//! the grace period has run out) every position in the round is settled
//! exactly once. Settling the same position again returns the stored
//! record unchanged.

use crate::daily::{utc_date, DailyTotals, DailyTotalsBook};
use crate::error::{SettlementError, SettlementResult};
use crate::pnl::settle_position;
use crate::price_to_beat::PriceToBeatBook;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use updown_core::{Position, PositionId, Price, PriceToBeatTier, Round, Settlement};
use updown_telemetry::Metrics;

/// Invalid reason recorded for positions found open at startup.
pub const ORPHANED_ON_RESTART: &str = "orphaned_on_restart";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// How long after close to wait for a resolvable close price.
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: i64,
}

fn default_grace_seconds() -> i64 {
    30
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            grace_seconds: default_grace_seconds(),
        }
    }
}

impl SettlementConfig {
    pub fn validate(&self) -> SettlementResult<()> {
        if self.grace_seconds < 0 {
            return Err(SettlementError::ConfigError(
                "settlement.grace_seconds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reference-feed prices around a round's boundaries.
pub trait RoundPriceSource: Send + Sync {
    /// Close price, or `None` until the feed has ticked at or past close.
    fn close_price(&self, round: &Round) -> Option<Price>;

    /// Last tick observed before the round opened.
    fn last_tick_before_open(&self, round: &Round) -> Option<Price>;

    /// First tick observed inside the round.
    fn opening_tick(&self, round: &Round) -> Option<Price>;
}

#[derive(Debug)]
struct RoundPositions {
    round: Round,
    positions: Vec<Position>,
    closed: bool,
}

#[derive(Debug)]
pub struct SettlementEngine {
    config: SettlementConfig,
    book: Arc<PriceToBeatBook>,
    open: Mutex<BTreeMap<u64, RoundPositions>>,
    settled: DashMap<PositionId, Settlement>,
    daily: DailyTotalsBook,
}

impl SettlementEngine {
    pub fn new(config: SettlementConfig) -> SettlementResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            book: Arc::new(PriceToBeatBook::new()),
            open: Mutex::new(BTreeMap::new()),
            settled: DashMap::new(),
            daily: DailyTotalsBook::new(),
        })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Price-to-beat candidates, shared with reference fetch tasks.
    pub fn price_to_beat_book(&self) -> &Arc<PriceToBeatBook> {
        &self.book
    }

    /// Track a newly opened position.
    pub fn register(&self, round: Round, position: Position) {
        let mut open = self.open.lock();
        open.entry(round.round_id)
            .or_insert_with(|| RoundPositions {
                round,
                positions: Vec::new(),
                closed: false,
            })
            .positions
            .push(position);
    }

    /// Mark a round as closed so the next polls try to settle it.
    ///
    /// Also ages out reference prices and settlements older than the
    /// previous round, unless a round that old still holds open positions.
    pub fn on_round_closed(&self, round: &Round) {
        let oldest_kept = {
            let mut open = self.open.lock();
            if let Some(entry) = open.get_mut(&round.round_id) {
                entry.closed = true;
                info!(
                    round_id = round.round_id,
                    positions = entry.positions.len(),
                    "Round closed with open positions"
                );
            }
            let previous = round.round_id.saturating_sub(1);
            open.keys().next().map_or(previous, |&id| id.min(previous))
        };
        self.prune(oldest_kept);
    }

    fn prune(&self, oldest_kept: u64) {
        self.book.prune(oldest_kept);
        let before = self.settled.len();
        self.settled.retain(|_, s| s.round_id >= oldest_kept);
        let dropped = before.saturating_sub(self.settled.len());
        if dropped > 0 {
            debug!(oldest_kept, dropped, "Pruned settled positions");
        }
    }

    /// Settle every closed round whose inputs are ready.
    ///
    /// Returns only settlements created by this call.
    pub fn poll(&self, now_ms: i64, prices: &dyn RoundPriceSource) -> Vec<Settlement> {
        self.book.drain_reports();

        let due: Vec<(Round, Vec<Position>)> = {
            let open = self.open.lock();
            open.values()
                .filter(|r| r.closed)
                .map(|r| (r.round, r.positions.clone()))
                .collect()
        };

        let mut created = Vec::new();
        for (round, positions) in due {
            let expired = now_ms >= round.close_ms() + self.config.grace_seconds * 1000;

            if let Some(price) = prices.last_tick_before_open(&round) {
                self.book.record(round.round_id, PriceToBeatTier::LastTickBeforeOpen, price);
            }
            if let Some(price) = prices.opening_tick(&round) {
                self.book.record(round.round_id, PriceToBeatTier::OpeningTick, price);
            }

            let close = prices.close_price(&round);
            if close.is_none() && !expired {
                continue;
            }
            let ptb = self.book.resolve(round.round_id, now_ms, expired);
            if ptb.is_none() && !expired {
                continue;
            }
            if expired && (close.is_none() || ptb.is_none()) {
                warn!(
                    round_id = round.round_id,
                    close_known = close.is_some(),
                    price_to_beat_known = ptb.is_some(),
                    "Settlement grace expired, settling invalid"
                );
            }

            for position in &positions {
                if let Some(settlement) = self.settle_new(position, close, ptb, now_ms, None) {
                    created.push(settlement);
                }
            }
            self.open.lock().remove(&round.round_id);
        }
        created
    }

    /// Settle a position left open by a previous process as invalid.
    pub fn recover_orphan(&self, position: &Position, now_ms: i64) -> Settlement {
        self.settle(position, None, None, now_ms, Some(ORPHANED_ON_RESTART.to_string()))
    }

    /// Settle `position`; idempotent per position id.
    pub fn settle(
        &self,
        position: &Position,
        close: Option<Price>,
        price_to_beat: Option<updown_core::PriceToBeat>,
        now_ms: i64,
        invalid_reason: Option<String>,
    ) -> Settlement {
        if let Some(existing) = self.settlement(&position.id) {
            return existing;
        }
        self.settle_new(position, close, price_to_beat, now_ms, invalid_reason.clone())
            .or_else(|| self.settlement(&position.id))
            .unwrap_or_else(|| settle_position(position, close, price_to_beat, now_ms, invalid_reason))
    }

    /// Returns `None` if the position was already settled.
    fn settle_new(
        &self,
        position: &Position,
        close: Option<Price>,
        price_to_beat: Option<updown_core::PriceToBeat>,
        now_ms: i64,
        invalid_reason: Option<String>,
    ) -> Option<Settlement> {
        let entry = self.settled.entry(position.id.clone());
        let dashmap::mapref::entry::Entry::Vacant(slot) = entry else {
            return None;
        };
        let settlement = settle_position(position, close, price_to_beat, now_ms, invalid_reason);
        slot.insert(settlement.clone());

        self.daily.record(&settlement);
        let net = settlement.net_pnl_usd.inner().to_f64().unwrap_or(0.0);
        Metrics::settled(settlement.outcome.as_str(), net);
        info!(
            position_id = %settlement.position_id,
            round_id = settlement.round_id,
            action = %settlement.action,
            outcome = %settlement.outcome,
            net_pnl = %settlement.net_pnl_usd.round_dp(4),
            reason = ?settlement.invalid_reason,
            "Position settled"
        );
        Some(settlement)
    }

    pub fn settlement(&self, id: &PositionId) -> Option<Settlement> {
        self.settled.get(id).map(|s| s.clone())
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.open
            .lock()
            .values()
            .flat_map(|r| r.positions.iter().cloned())
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().values().map(|r| r.positions.len()).sum()
    }

    pub fn today(&self, now_ms: i64) -> DailyTotals {
        self.daily.day(utc_date(now_ms))
    }

    pub fn daily_totals(&self) -> Vec<DailyTotals> {
        self.daily.all()
    }
}
