//! Per-round risk guard.
//!
//! Gates a trade decision into an `Intent`. Checks run in a fixed order
//! and stop at the first block:
//! 1. kill switch
//! 2. trades this round
//! 3. cooldown since the last intent this round
//! 4. committed notional this round (when capped)
//!
//! Rejections never raise; they are returned with a reason.

use crate::error::{RiskError, RiskResult};
use crate::kill_switch::KillSwitch;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use updown_core::{Decision, Intent, Usd};
use updown_telemetry::Metrics;

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_trades_per_round")]
    pub max_trades_per_round: u32,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i64,
    /// Cap on notional committed per round. Unset means uncapped.
    #[serde(default)]
    pub max_round_notional_usd: Option<Decimal>,
}

fn default_max_trades_per_round() -> u32 {
    2
}

fn default_cooldown_seconds() -> i64 {
    8
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_trades_per_round: default_max_trades_per_round(),
            cooldown_seconds: default_cooldown_seconds(),
            max_round_notional_usd: None,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.max_trades_per_round == 0 {
            return Err(RiskError::ConfigError(
                "risk.max_trades_per_round must be at least 1".to_string(),
            ));
        }
        if self.cooldown_seconds < 0 {
            return Err(RiskError::ConfigError(
                "risk.cooldown_seconds must be non-negative".to_string(),
            ));
        }
        if self
            .max_round_notional_usd
            .is_some_and(|cap| cap <= Decimal::ZERO)
        {
            return Err(RiskError::ConfigError(
                "risk.max_round_notional_usd must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Rejection
// ============================================================================

/// Why the guard refused a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    KillSwitchActive,
    RoundTradeLimit,
    CooldownActive,
    RoundNotionalLimit,
    /// The decision was NONE; nothing to gate.
    NoTrade,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KillSwitchActive => "kill_switch_active",
            Self::RoundTradeLimit => "round_trade_limit",
            Self::CooldownActive => "cooldown_active",
            Self::RoundNotionalLimit => "round_notional_limit",
            Self::NoTrade => "no_trade",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Counters for one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoundCounters {
    pub trades: u32,
    pub last_intent_ms: Option<i64>,
    pub committed_notional: Usd,
}

#[derive(Debug, Default)]
struct GuardState {
    rounds: HashMap<u64, RoundCounters>,
    last_rejection: Option<(u64, RejectReason)>,
}

/// Gating layer between the router and the execution simulator.
#[derive(Debug)]
pub struct RiskGuard {
    config: RiskConfig,
    kill_switch: Arc<KillSwitch>,
    /// Smallest trade the simulator can open; reserved against the cap.
    min_trade_usd: Usd,
    state: Mutex<GuardState>,
}

impl RiskGuard {
    pub fn new(config: RiskConfig, kill_switch: Arc<KillSwitch>, min_trade_usd: Usd) -> Self {
        Self {
            config,
            kill_switch,
            min_trade_usd,
            state: Mutex::new(GuardState::default()),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn kill_switch(&self) -> &Arc<KillSwitch> {
        &self.kill_switch
    }

    /// Gate `decision` for `round_id` at `now_ms`.
    ///
    /// On success the round's trade count and cooldown start are updated
    /// and the returned intent carries the next per-round sequence.
    pub fn allow(&self, decision: Decision, round_id: u64, now_ms: i64) -> Result<Intent, RejectReason> {
        if !decision.is_trade() {
            return Err(RejectReason::NoTrade);
        }

        let mut state = self.state.lock();
        let counters = state.rounds.get(&round_id).cloned().unwrap_or_default();

        if let Err(reason) = self.check(&counters, now_ms) {
            Metrics::risk_rejected(reason.as_str());
            if state.last_rejection != Some((round_id, reason)) {
                info!(
                    round_id,
                    reason = %reason,
                    action = %decision.action,
                    trades = counters.trades,
                    "Risk guard rejected decision"
                );
                state.last_rejection = Some((round_id, reason));
            } else {
                debug!(round_id, reason = %reason, "Risk guard rejected decision");
            }
            return Err(reason);
        }

        state.last_rejection = None;
        let entry = state.rounds.entry(round_id).or_default();
        entry.trades += 1;
        entry.last_intent_ms = Some(now_ms);
        let sequence = entry.trades;
        state.rounds.retain(|id, _| *id + 1 >= round_id);

        info!(
            round_id,
            sequence,
            action = %decision.action,
            strategy = %decision.strategy,
            confidence = decision.confidence,
            "Intent issued"
        );
        Ok(Intent {
            decision,
            round_id,
            sequence,
            issued_at_ms: now_ms,
        })
    }

    fn check(&self, counters: &RoundCounters, now_ms: i64) -> Result<(), RejectReason> {
        if self.kill_switch.is_engaged() {
            return Err(RejectReason::KillSwitchActive);
        }
        if counters.trades >= self.config.max_trades_per_round {
            return Err(RejectReason::RoundTradeLimit);
        }
        if let Some(last) = counters.last_intent_ms {
            if now_ms - last < self.config.cooldown_seconds * 1000 {
                return Err(RejectReason::CooldownActive);
            }
        }
        if let Some(cap) = self.config.max_round_notional_usd {
            if (counters.committed_notional + self.min_trade_usd).inner() > cap {
                return Err(RejectReason::RoundNotionalLimit);
            }
        }
        Ok(())
    }

    /// Record notional actually committed by the simulator for a round.
    pub fn commit_notional(&self, round_id: u64, notional: Usd) {
        let mut state = self.state.lock();
        let entry = state.rounds.entry(round_id).or_default();
        entry.committed_notional += notional;
    }

    /// Count a position opened by an earlier process against its round.
    ///
    /// Keeps the per-round limits and intent sequence intact across a
    /// restart inside the same round.
    pub fn restore(&self, round_id: u64, opened_at_ms: i64, notional: Usd) {
        let mut state = self.state.lock();
        let entry = state.rounds.entry(round_id).or_default();
        entry.trades += 1;
        entry.last_intent_ms = Some(
            entry
                .last_intent_ms
                .map_or(opened_at_ms, |t| t.max(opened_at_ms)),
        );
        entry.committed_notional += notional;
    }

    /// Notional left under the round cap, or `None` when no cap is set.
    pub fn notional_headroom(&self, round_id: u64) -> Option<Usd> {
        let cap = self.config.max_round_notional_usd?;
        let committed = self.counters(round_id).committed_notional;
        Some(Usd::new((cap - committed.inner()).max(Decimal::ZERO)))
    }

    /// Current counters for a round.
    pub fn counters(&self, round_id: u64) -> RoundCounters {
        self.state.lock().rounds.get(&round_id).cloned().unwrap_or_default()
    }

    /// Drop counters older than the round before `round_id`.
    pub fn prune(&self, round_id: u64) {
        self.state.lock().rounds.retain(|id, _| *id + 1 >= round_id);
    }

    /// Rounds with live counters.
    pub fn tracked_rounds(&self) -> usize {
        self.state.lock().rounds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::Action;

    fn decision() -> Decision {
        Decision::new(Action::BuyYes, 0.7, 0.4, "momentum", "short_return_up")
    }

    fn guard(config: RiskConfig) -> RiskGuard {
        RiskGuard::new(config, Arc::new(KillSwitch::new()), Usd::new(dec!(5)))
    }

    #[test]
    fn test_allow_issues_sequenced_intents() {
        let g = guard(RiskConfig::default());
        let first = g.allow(decision(), 10, 0).unwrap();
        assert_eq!((first.round_id, first.sequence), (10, 1));
        let second = g.allow(decision(), 10, 8_000).unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.key(), "10-2");
    }

    #[test]
    fn test_round_trade_limit() {
        let g = guard(RiskConfig::default());
        g.allow(decision(), 10, 0).unwrap();
        g.allow(decision(), 10, 10_000).unwrap();
        assert_eq!(
            g.allow(decision(), 10, 20_000).unwrap_err(),
            RejectReason::RoundTradeLimit
        );
        // A new round starts fresh.
        assert!(g.allow(decision(), 11, 20_000).is_ok());
    }

    #[test]
    fn test_cooldown() {
        let g = guard(RiskConfig::default());
        g.allow(decision(), 10, 1_000).unwrap();
        assert_eq!(
            g.allow(decision(), 10, 8_999).unwrap_err(),
            RejectReason::CooldownActive
        );
        assert!(g.allow(decision(), 10, 9_000).is_ok());
    }

    #[test]
    fn test_kill_switch_checked_first() {
        let g = guard(RiskConfig::default());
        g.allow(decision(), 10, 0).unwrap();
        g.kill_switch().engage("manual");
        // Cooldown would also block; kill switch wins.
        assert_eq!(
            g.allow(decision(), 10, 1_000).unwrap_err(),
            RejectReason::KillSwitchActive
        );
        g.kill_switch().clear();
        assert_eq!(
            g.allow(decision(), 10, 1_000).unwrap_err(),
            RejectReason::CooldownActive
        );
    }

    #[test]
    fn test_round_notional_cap() {
        let g = guard(RiskConfig {
            max_trades_per_round: 5,
            cooldown_seconds: 0,
            max_round_notional_usd: Some(dec!(30)),
        });
        g.allow(decision(), 10, 0).unwrap();
        g.commit_notional(10, Usd::new(dec!(25)));
        // 25 + 5 == 30 is still allowed.
        g.allow(decision(), 10, 1).unwrap();
        g.commit_notional(10, Usd::new(dec!(1)));
        assert_eq!(
            g.allow(decision(), 10, 2).unwrap_err(),
            RejectReason::RoundNotionalLimit
        );
    }

    #[test]
    fn test_notional_headroom() {
        let g = guard(RiskConfig {
            max_trades_per_round: 5,
            cooldown_seconds: 0,
            max_round_notional_usd: Some(dec!(30)),
        });
        assert_eq!(g.notional_headroom(10), Some(Usd::new(dec!(30))));
        g.commit_notional(10, Usd::new(dec!(18)));
        assert_eq!(g.notional_headroom(10), Some(Usd::new(dec!(12))));
        g.commit_notional(10, Usd::new(dec!(20)));
        assert_eq!(g.notional_headroom(10), Some(Usd::ZERO));

        assert_eq!(guard(RiskConfig::default()).notional_headroom(10), None);
    }

    #[test]
    fn test_none_decision_not_counted() {
        let g = guard(RiskConfig::default());
        assert_eq!(
            g.allow(Decision::none("no_strategy_signal"), 10, 0).unwrap_err(),
            RejectReason::NoTrade
        );
        assert_eq!(g.counters(10).trades, 0);
    }

    #[test]
    fn test_counters_pruned_to_previous_round() {
        let g = guard(RiskConfig::default());
        for round in 1..=5 {
            g.allow(decision(), round, 0).unwrap();
        }
        assert_eq!(g.tracked_rounds(), 2);
        assert_eq!(g.counters(3).trades, 0);
        assert_eq!(g.counters(4).trades, 1);
    }

    #[test]
    fn test_restored_positions_count_against_round() {
        let g = guard(RiskConfig::default());
        g.restore(9, 1_000, Usd::new(dec!(10)));

        let counters = g.counters(9);
        assert_eq!(counters.trades, 1);
        assert_eq!(counters.last_intent_ms, Some(1_000));

        assert_eq!(
            g.allow(decision(), 9, 5_000).unwrap_err(),
            RejectReason::CooldownActive
        );
        let intent = g.allow(decision(), 9, 10_000).unwrap();
        assert_eq!(intent.sequence, 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(RiskConfig::default().validate().is_ok());
        let bad = RiskConfig {
            max_trades_per_round: 0,
            ..RiskConfig::default()
        };
        assert!(bad.validate().is_err());
        let parsed: RiskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.max_trades_per_round, 2);
        assert_eq!(parsed.cooldown_seconds, 8);
    }
}
