//! Dashboard state.
//!
//! The evaluation loop pushes into this; HTTP handlers only read it,
//! apart from the kill switch.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use updown_core::{Decision, OddsSnapshot, Position, PriceToBeat, Round, Settlement, Tick};
use updown_risk::KillSwitch;
use updown_settlement::DailyTotals;

use crate::config::DashboardConfig;
use crate::events::{EventEntry, EventLog};
use crate::types::{PaperTrade, RoundStatus, StatusSnapshot};

#[derive(Debug, Default)]
struct LiveStatus {
    round: Option<Round>,
    price_to_beat: Option<PriceToBeat>,
    latest_tick: Option<Tick>,
    last_decision: Option<Decision>,
    odds: Option<OddsSnapshot>,
    open_positions: usize,
    today: Option<DailyTotals>,
}

#[derive(Debug)]
struct Inner {
    live: RwLock<LiveStatus>,
    events: Mutex<EventLog>,
    trades: RwLock<VecDeque<PaperTrade>>,
    trades_capacity: usize,
    kill_switch: Arc<KillSwitch>,
}

/// Shared, cheaply cloneable dashboard state.
#[derive(Debug, Clone)]
pub struct DashboardState {
    inner: Arc<Inner>,
}

impl DashboardState {
    pub fn new(config: &DashboardConfig, kill_switch: Arc<KillSwitch>) -> Self {
        Self {
            inner: Arc::new(Inner {
                live: RwLock::new(LiveStatus::default()),
                events: Mutex::new(EventLog::new(config.event_log_capacity)),
                trades: RwLock::new(VecDeque::with_capacity(config.paper_trades_capacity)),
                trades_capacity: config.paper_trades_capacity.max(1),
                kill_switch,
            }),
        }
    }

    pub fn kill_switch(&self) -> &Arc<KillSwitch> {
        &self.inner.kill_switch
    }

    // ------------------------------------------------------------------
    // Updates from the evaluation loop
    // ------------------------------------------------------------------

    pub fn set_round(&self, round: Option<Round>, price_to_beat: Option<PriceToBeat>) {
        let mut live = self.inner.live.write();
        live.round = round;
        live.price_to_beat = price_to_beat;
    }

    pub fn set_latest_tick(&self, tick: Tick) {
        self.inner.live.write().latest_tick = Some(tick);
    }

    pub fn set_last_decision(&self, decision: Decision) {
        self.inner.live.write().last_decision = Some(decision);
    }

    pub fn set_odds(&self, odds: Option<OddsSnapshot>) {
        self.inner.live.write().odds = odds;
    }

    pub fn set_book(&self, open_positions: usize, today: DailyTotals) {
        let mut live = self.inner.live.write();
        live.open_positions = open_positions;
        live.today = Some(today);
    }

    /// Run `f` against the event log.
    pub fn with_events<R>(&self, f: impl FnOnce(&mut EventLog) -> R) -> R {
        f(&mut self.inner.events.lock())
    }

    pub fn push_event(&self, entry: EventEntry) {
        self.inner.events.lock().push(entry);
    }

    pub fn record_position(&self, position: Position) {
        let mut trades = self.inner.trades.write();
        if trades.len() == self.inner.trades_capacity {
            trades.pop_front();
        }
        trades.push_back(PaperTrade {
            position,
            settlement: None,
        });
    }

    /// Attach a settlement to its trade record. Trades that already fell
    /// out of the window get a fresh record.
    pub fn record_settlement(&self, position: &Position, settlement: Settlement) {
        let mut trades = self.inner.trades.write();
        if let Some(trade) = trades
            .iter_mut()
            .rev()
            .find(|t| t.position.id == settlement.position_id)
        {
            trade.settlement = Some(settlement);
            return;
        }
        if trades.len() == self.inner.trades_capacity {
            trades.pop_front();
        }
        trades.push_back(PaperTrade {
            position: position.clone(),
            settlement: Some(settlement),
        });
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn snapshot(&self, now_ms: i64) -> StatusSnapshot {
        let live = self.inner.live.read();
        StatusSnapshot {
            timestamp_ms: now_ms,
            round: live
                .round
                .as_ref()
                .map(|r| RoundStatus::from_round(r, now_ms, live.price_to_beat)),
            latest_tick: live.latest_tick.clone(),
            last_decision: live.last_decision.clone(),
            odds: live.odds.clone(),
            kill_switch: self.inner.kill_switch.status(),
            open_positions: live.open_positions,
            today: live.today.clone(),
            events: self.inner.events.lock().entries(),
        }
    }

    /// Oldest first.
    pub fn paper_trades(&self) -> Vec<PaperTrade> {
        self.inner.trades.read().iter().cloned().collect()
    }
}
