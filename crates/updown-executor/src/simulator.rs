//! Paper execution simulator.
//!
//! Turns an approved `Intent` into a `Position` priced off live odds.
//! The economics gate runs here, after policy gating: a trade whose
//! expected net edge misses `min_net_edge_bps` is blocked and no position
//! is created. Re-submitting an intent returns the position it already
//! opened.

use crate::config::ExecutionConfig;
use crate::costs::{self, CostEstimate, SlippageInputs};
use crate::error::ExecutorResult;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};
use updown_core::{Action, Intent, OddsSnapshot, Position, PositionId, Price, Usd};
use updown_telemetry::Metrics;

/// Market view at the moment of execution.
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    pub odds: OddsSnapshot,
    /// Latest reference tick, recorded on the position for audit.
    pub reference_price: Option<Price>,
    pub seconds_to_close: Option<i64>,
    pub round_secs: Option<i64>,
    /// Notional still available under the round cap, if one is set.
    pub notional_headroom: Option<Usd>,
}

/// Why the simulator refused to open a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    NetEdgeBelowThreshold,
    MissingEntryPrice,
    RoundNotionalExhausted,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetEdgeBelowThreshold => "net_edge_below_threshold",
            Self::MissingEntryPrice => "missing_entry_price",
            Self::RoundNotionalExhausted => "round_notional_exhausted",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A blocked trade with the numbers behind the decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Blocked {
    pub reason: BlockReason,
    pub round_id: u64,
    pub action: Action,
    pub costs: Option<CostEstimate>,
    pub min_net_edge_bps: Option<Decimal>,
}

#[derive(Debug)]
pub struct ExecutionSimulator {
    config: ExecutionConfig,
    /// Opened positions keyed by intent key.
    opened: DashMap<String, Position>,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionConfig) -> ExecutorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            opened: DashMap::new(),
        })
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Simulate the fill for `intent`.
    pub fn execute(
        &self,
        intent: &Intent,
        market: &MarketView,
        now_ms: i64,
    ) -> Result<Position, Blocked> {
        let key = intent.key();
        if let Some(existing) = self.opened.get(&key) {
            debug!(intent = %key, "Intent already executed, returning existing position");
            return Ok(existing.clone());
        }

        let decision = &intent.decision;
        let blocked = |reason: BlockReason, costs: Option<CostEstimate>| {
            Metrics::economics_blocked(reason.as_str());
            Blocked {
                reason,
                round_id: intent.round_id,
                action: decision.action,
                costs,
                min_net_edge_bps: self.config.min_net_edge_bps,
            }
        };

        let entry_price = match market.odds.price_for(decision.action) {
            Some(p) if p.is_positive() && p.inner() < Decimal::ONE => p,
            other => {
                info!(
                    round_id = intent.round_id,
                    action = %decision.action,
                    price = ?other,
                    "Execution blocked: no usable held-token price"
                );
                return Err(blocked(BlockReason::MissingEntryPrice, None));
            }
        };

        if let Some(headroom) = market.notional_headroom {
            if headroom.inner() < self.config.min_trade_usd {
                info!(
                    round_id = intent.round_id,
                    action = %decision.action,
                    headroom = %headroom,
                    "Execution blocked: round notional cap reached"
                );
                return Err(blocked(BlockReason::RoundNotionalExhausted, None));
            }
        }

        let edge_strength = market.odds.edge_strength();
        let notional = costs::position_size(&self.config, edge_strength, market.notional_headroom);
        let inputs = SlippageInputs {
            edge_strength,
            confidence: decision.confidence,
            seconds_to_close: market.seconds_to_close,
            round_secs: market.round_secs,
        };
        let estimate = costs::estimate(&self.config, notional, decision.score, &inputs);

        if let Some(min_net) = self.config.min_net_edge_bps {
            if estimate.net_edge_bps < min_net {
                info!(
                    round_id = intent.round_id,
                    action = %decision.action,
                    expected_edge_bps = %estimate.expected_edge_bps.round_dp(4),
                    total_cost_bps = %estimate.total_cost_bps.round_dp(4),
                    net_edge_bps = %estimate.net_edge_bps.round_dp(4),
                    min_net_edge_bps = %min_net,
                    "Execution blocked: net edge below threshold"
                );
                return Err(blocked(BlockReason::NetEdgeBelowThreshold, Some(estimate)));
            }
        }

        let position = Position {
            id: PositionId::new(key.clone()),
            round_id: intent.round_id,
            action: decision.action,
            entry_price,
            notional_usd: notional,
            slippage_bps: estimate.slippage_bps,
            fee_usd: estimate.fee_usd,
            adverse_selection_bps: estimate.adverse_selection_bps,
            expected_edge_bps: estimate.expected_edge_bps,
            total_cost_bps: estimate.total_cost_bps,
            confidence: decision.confidence,
            score: decision.score,
            strategy: decision.strategy.clone(),
            reference_price_at_entry: market.reference_price,
            opened_at_ms: now_ms,
        };

        Metrics::position_opened(decision.action.as_str());
        info!(
            position_id = %position.id,
            round_id = position.round_id,
            action = %position.action,
            entry_price = %position.entry_price,
            notional = %position.notional_usd,
            total_cost_bps = %position.total_cost_bps.round_dp(4),
            "Paper position opened"
        );
        self.opened.insert(key, position.clone());
        Ok(position)
    }

    /// Forget positions older than the round before `round_id`.
    pub fn prune(&self, round_id: u64) {
        self.opened.retain(|_, p| p.round_id + 1 >= round_id);
    }

    pub fn opened_count(&self) -> usize {
        self.opened.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::Decision;

    fn intent(action: Action, score: f64, sequence: u32) -> Intent {
        Intent {
            decision: Decision::new(action, 0.7, score, "momentum", "test"),
            round_id: 7,
            sequence,
            issued_at_ms: 1_000,
        }
    }

    fn market(yes: Option<Decimal>, no: Option<Decimal>) -> MarketView {
        MarketView {
            odds: OddsSnapshot {
                market_slug: Some("btc-updown-15m-6300".to_string()),
                yes_price: yes.map(Price::new),
                no_price: no.map(Price::new),
                updated_at_ms: Some(900),
            },
            reference_price: Some(Price::new(dec!(100000))),
            seconds_to_close: Some(120),
            round_secs: Some(900),
            notional_headroom: None,
        }
    }

    #[test]
    fn test_opens_position_on_held_token() {
        let sim = ExecutionSimulator::new(ExecutionConfig::default()).unwrap();
        let position = sim
            .execute(&intent(Action::BuyNo, -0.4, 1), &market(Some(dec!(0.3)), Some(dec!(0.7))), 1_000)
            .unwrap();
        assert_eq!(position.id.as_str(), "7-1");
        assert_eq!(position.entry_price, Price::new(dec!(0.7)));
        // 0.5 * 0.4 * 100
        assert_eq!(position.notional_usd, Usd::new(dec!(20)));
        assert_eq!(position.slippage_bps, dec!(50));
        assert_eq!(position.fee_usd, Usd::new(dec!(0.10)));
        assert_eq!(position.total_cost_bps, dec!(130));
        assert_eq!(position.strategy, "momentum");
    }

    #[test]
    fn test_size_limited_by_round_headroom() {
        let sim = ExecutionSimulator::new(ExecutionConfig::default()).unwrap();
        let mut view = market(Some(dec!(0.8)), Some(dec!(0.1)));
        view.notional_headroom = Some(Usd::new(dec!(15)));

        // Unbounded size would be 0.5 * 0.7 * 100 = 35
        let position = sim.execute(&intent(Action::BuyYes, 0.4, 1), &view, 1_000).unwrap();
        assert_eq!(position.notional_usd, Usd::new(dec!(15)));

        view.notional_headroom = Some(Usd::new(dec!(4)));
        let blocked = sim.execute(&intent(Action::BuyYes, 0.4, 2), &view, 1_000).unwrap_err();
        assert_eq!(blocked.reason, BlockReason::RoundNotionalExhausted);
        assert_eq!(sim.opened_count(), 1);
    }

    #[test]
    fn test_missing_entry_price_blocks() {
        let sim = ExecutionSimulator::new(ExecutionConfig::default()).unwrap();
        let blocked = sim
            .execute(&intent(Action::BuyYes, 0.4, 1), &market(None, Some(dec!(0.5))), 1_000)
            .unwrap_err();
        assert_eq!(blocked.reason, BlockReason::MissingEntryPrice);
        assert_eq!(sim.opened_count(), 0);
    }

    #[test]
    fn test_net_edge_gate() {
        let sim = ExecutionSimulator::new(ExecutionConfig {
            min_net_edge_bps: Some(dec!(100)),
            ..ExecutionConfig::default()
        })
        .unwrap();
        let view = market(Some(dec!(0.6)), Some(dec!(0.4)));

        // expected 200, cost 130 -> net 70 < 100
        let blocked = sim.execute(&intent(Action::BuyYes, 0.4, 1), &view, 1_000).unwrap_err();
        assert_eq!(blocked.reason, BlockReason::NetEdgeBelowThreshold);
        assert!(blocked.costs.is_some());

        // expected 450 -> net 320
        assert!(sim.execute(&intent(Action::BuyYes, 0.9, 2), &view, 1_000).is_ok());
    }

    #[test]
    fn test_gate_disabled_without_threshold() {
        let sim = ExecutionSimulator::new(ExecutionConfig::default()).unwrap();
        let view = market(Some(dec!(0.6)), Some(dec!(0.4)));
        assert!(sim.execute(&intent(Action::BuyYes, 0.01, 1), &view, 1_000).is_ok());
    }

    #[test]
    fn test_execute_is_idempotent_per_intent() {
        let sim = ExecutionSimulator::new(ExecutionConfig::default()).unwrap();
        let view = market(Some(dec!(0.6)), Some(dec!(0.4)));
        let first = sim.execute(&intent(Action::BuyYes, 0.4, 1), &view, 1_000).unwrap();
        let again = sim.execute(&intent(Action::BuyYes, 0.4, 1), &view, 5_000).unwrap();
        assert_eq!(first, again);
        assert_eq!(sim.opened_count(), 1);

        sim.prune(9);
        assert_eq!(sim.opened_count(), 0);
    }
}
