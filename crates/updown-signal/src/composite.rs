//! Composite multi-signal strategy.
//!
//! Six scored inputs are blended by weight. Confidence gets an agreement
//! bonus when the directional inputs point the same way. A streak of
//! BUY_NO outputs raises the score bar for further BUY_NO decisions.

use crate::context::EvalContext;
use crate::error::{SignalError, SignalResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use updown_core::{Action, Decision, SignalScore};

pub const STRATEGY_NAME: &str = "composite";

const RECENT_ACTIONS: usize = 40;
const BUY_NO_SHARE_LIMIT: f64 = 0.75;
const BUY_NO_SCORE_PENALTY: f64 = 0.05;
const DIRECTIONAL_THRESHOLD: f64 = 0.1;
const AGREEMENT_BONUS: f64 = 0.15;

/// Composite strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub min_confidence: f64,
    pub min_score: f64,
    /// Skip when the held-token price is above this.
    pub max_entry_price: f64,
    pub kelly_fraction: f64,
    /// Bankroll used for the Kelly size check.
    pub max_trade_size_usd: f64,
    /// Kelly sizes below this are skipped.
    pub min_trade_size_usd: f64,
    pub weight_time_decay: f64,
    pub weight_orderbook_imbalance: f64,
    pub weight_trade_momentum: f64,
    pub weight_price_movement: f64,
    pub weight_price_inefficiency: f64,
    pub weight_feed_comparison: f64,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
            min_score: 0.2,
            max_entry_price: 0.85,
            kelly_fraction: 0.3,
            max_trade_size_usd: 100.0,
            min_trade_size_usd: 1.0,
            weight_time_decay: 0.20,
            weight_orderbook_imbalance: 0.20,
            weight_trade_momentum: 0.15,
            weight_price_movement: 0.20,
            weight_price_inefficiency: 0.20,
            weight_feed_comparison: 0.05,
        }
    }
}

impl CompositeConfig {
    pub fn validate(&self) -> SignalResult<()> {
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("max_entry_price", self.max_entry_price),
            ("kelly_fraction", self.kelly_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SignalError::ConfigError(format!(
                    "composite.{name} ({value}) must be within [0, 1]"
                )));
            }
        }
        let weights = self.weights();
        if weights.iter().any(|(_, w)| *w < 0.0) {
            return Err(SignalError::ConfigError(
                "composite weights must be non-negative".to_string(),
            ));
        }
        if weights.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
            return Err(SignalError::ConfigError(
                "composite weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }

    fn weights(&self) -> [(&'static str, f64); 6] {
        [
            ("time_decay", self.weight_time_decay),
            ("orderbook_imbalance", self.weight_orderbook_imbalance),
            ("trade_momentum", self.weight_trade_momentum),
            ("price_movement", self.weight_price_movement),
            ("price_inefficiency", self.weight_price_inefficiency),
            ("feed_comparison", self.weight_feed_comparison),
        ]
    }
}

/// Weighted multi-signal strategy with a BUY_NO streak guard.
#[derive(Debug, Clone)]
pub struct CompositeStrategy {
    config: CompositeConfig,
    recent_actions: VecDeque<Action>,
}

impl CompositeStrategy {
    pub fn new(config: CompositeConfig) -> Self {
        Self {
            config,
            recent_actions: VecDeque::with_capacity(RECENT_ACTIONS),
        }
    }

    pub fn config(&self) -> &CompositeConfig {
        &self.config
    }

    /// Score every input and decide. Emitted actions feed the streak guard.
    pub fn evaluate(&mut self, ctx: &EvalContext) -> Option<Decision> {
        let signals = score_signals(ctx);
        let (score, confidence) = self.blend(&signals);

        let action = if score > 0.0 { Action::BuyYes } else { Action::BuyNo };
        let mut required_score = self.config.min_score;
        if action == Action::BuyNo && self.buy_no_share() > BUY_NO_SHARE_LIMIT {
            required_score += BUY_NO_SCORE_PENALTY;
        }

        if confidence < self.config.min_confidence || score.abs() < required_score {
            return None;
        }

        let entry_price = ctx.odds.price_for(action).map(|p| p.to_f64());
        if entry_price.is_some_and(|p| p > self.config.max_entry_price) {
            return None;
        }
        if self.kelly_size(confidence, entry_price.unwrap_or(0.5)) < self.config.min_trade_size_usd
        {
            return None;
        }

        if self.recent_actions.len() == RECENT_ACTIONS {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back(action);

        Some(
            Decision::new(action, confidence, score, STRATEGY_NAME, "composite_signal")
                .with_signals(signals),
        )
    }

    /// Share of BUY_NO among recently emitted actions.
    pub fn buy_no_share(&self) -> f64 {
        if self.recent_actions.is_empty() {
            return 0.0;
        }
        let buy_no = self
            .recent_actions
            .iter()
            .filter(|a| **a == Action::BuyNo)
            .count();
        buy_no as f64 / self.recent_actions.len() as f64
    }

    fn blend(&self, signals: &BTreeMap<String, SignalScore>) -> (f64, f64) {
        let mut weight_total = 0.0;
        let mut score_total = 0.0;
        let mut conf_total = 0.0;
        let mut directional = 0i32;
        let mut agreeing = 0i32;

        for (name, weight) in self.config.weights() {
            let Some(signal) = signals.get(name) else {
                continue;
            };
            score_total += signal.score * weight;
            conf_total += signal.confidence * weight;
            weight_total += weight;

            if signal.score > DIRECTIONAL_THRESHOLD {
                directional += 1;
                agreeing += 1;
            } else if signal.score < -DIRECTIONAL_THRESHOLD {
                directional += 1;
                agreeing -= 1;
            }
        }

        if weight_total <= 0.0 {
            return (0.0, 0.0);
        }

        let score = score_total / weight_total;
        let mut confidence = conf_total / weight_total;
        if directional > 0 {
            let agreement = agreeing.abs() as f64 / directional as f64;
            confidence += AGREEMENT_BONUS * agreement;
        }
        (score.clamp(-1.0, 1.0), confidence.clamp(0.0, 1.0))
    }

    /// Fractional Kelly stake for a binary payout at `entry_price`.
    fn kelly_size(&self, confidence: f64, entry_price: f64) -> f64 {
        if entry_price <= 0.0 || entry_price >= 1.0 {
            return 0.0;
        }
        let p = confidence.clamp(0.01, 0.99);
        let q = 1.0 - p;
        let b = (1.0 - entry_price) / entry_price;
        let kelly = ((p * b - q) / b).max(0.0) * self.config.kelly_fraction;
        (kelly * self.config.max_trade_size_usd).min(self.config.max_trade_size_usd)
    }
}

// ============================================================================
// Individual signals
// ============================================================================

fn score_signals(ctx: &EvalContext) -> BTreeMap<String, SignalScore> {
    [
        ("time_decay", time_decay(ctx)),
        ("orderbook_imbalance", orderbook_imbalance(ctx)),
        ("trade_momentum", trade_momentum(ctx)),
        ("price_movement", price_movement(ctx)),
        ("price_inefficiency", price_inefficiency(ctx)),
        ("feed_comparison", feed_comparison(ctx)),
    ]
    .into_iter()
    .map(|(name, s)| (name.to_string(), s))
    .collect()
}

fn time_decay(ctx: &EvalContext) -> SignalScore {
    let Some(closeness) = ctx.closeness() else {
        return SignalScore::unavailable(0.1, "missing_time_context");
    };
    let Some(ret) = ctx.features.return_short else {
        return SignalScore::unavailable(0.1, "missing_price_movement");
    };
    if closeness < 0.6 {
        return SignalScore::new(0.0, 0.15, "outside_decay_window");
    }
    SignalScore::new(
        (ret * 80.0).clamp(-1.0, 1.0),
        (0.3 + 0.5 * closeness).clamp(0.0, 1.0),
        "time_decay_active",
    )
}

fn orderbook_imbalance(ctx: &EvalContext) -> SignalScore {
    let Some(imbalance) = ctx.orderbook_imbalance else {
        return SignalScore::unavailable(0.1, "orderbook_unavailable");
    };
    let score = imbalance.clamp(-1.0, 1.0);
    SignalScore::new(score, (0.3 + score.abs() * 0.5).clamp(0.0, 1.0), "orderbook_imbalance")
}

fn trade_momentum(ctx: &EvalContext) -> SignalScore {
    let Some(momentum) = ctx.trade_momentum else {
        return SignalScore::unavailable(0.1, "trade_flow_unavailable");
    };
    let score = momentum.clamp(-1.0, 1.0);
    SignalScore::new(score, (0.25 + score.abs() * 0.6).clamp(0.0, 1.0), "trade_momentum")
}

fn price_movement(ctx: &EvalContext) -> SignalScore {
    let Some(ret) = ctx.features.return_short else {
        return SignalScore::unavailable(0.1, "missing_return_short");
    };
    if ret.abs() < 0.0001 {
        return SignalScore::new(0.0, 0.15, "movement_noise");
    }
    SignalScore::new(
        (ret * 50.0).clamp(-1.0, 1.0),
        (0.3 + ret.abs() * 250.0).clamp(0.0, 0.95),
        "price_movement",
    )
}

fn price_inefficiency(ctx: &EvalContext) -> SignalScore {
    let (Some(z), Some(yes)) = (ctx.features.zscore, ctx.odds.yes_price) else {
        return SignalScore::unavailable(0.1, "missing_inefficiency_inputs");
    };
    let fair_yes = (0.5 - z * 0.08).clamp(0.05, 0.95);
    let mispricing = fair_yes - yes.to_f64();
    if mispricing.abs() < 0.05 {
        return SignalScore::new(0.0, 0.15, "mispricing_small");
    }
    SignalScore::new(
        (mispricing * 5.0).clamp(-1.0, 1.0),
        (0.25 + mispricing.abs() * 2.0).clamp(0.0, 0.95),
        "price_inefficiency",
    )
}

fn feed_comparison(ctx: &EvalContext) -> SignalScore {
    let Some(divergence) = ctx.feed_divergence_bps else {
        return SignalScore::unavailable(0.2, "single_feed_mode");
    };
    if divergence > 5.0 {
        return SignalScore::new(0.0, 0.05, "feeds_diverged");
    }
    let Some(ret) = ctx.features.return_short else {
        return SignalScore::new(0.0, 0.2, "missing_direction");
    };
    let score = if ret > 0.0 {
        0.15
    } else if ret < 0.0 {
        -0.15
    } else {
        0.0
    };
    SignalScore::new(score, 0.75, "feeds_agree")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Features;
    use rust_decimal_macros::dec;
    use updown_core::{OddsSnapshot, Price};

    fn odds(yes: rust_decimal::Decimal, no: rust_decimal::Decimal) -> OddsSnapshot {
        OddsSnapshot {
            market_slug: None,
            yes_price: Some(Price::new(yes)),
            no_price: Some(Price::new(no)),
            updated_at_ms: Some(0),
        }
    }

    /// Strong upward move near close with supportive odds.
    fn bullish_ctx() -> EvalContext {
        EvalContext::new(Features {
            last_price: Some(100.5),
            return_short: Some(0.01),
            zscore: Some(-2.0),
            samples: 60,
        })
        .with_timing(30, 900)
        .with_odds(odds(dec!(0.45), dec!(0.55)), Some(0.4), Some(0.5))
    }

    #[test]
    fn test_unavailable_signals_on_empty_context() {
        let signals = score_signals(&EvalContext::default());
        assert_eq!(signals.len(), 6);
        assert!(signals.values().all(|s| !s.available && s.score == 0.0));
        assert_eq!(signals["feed_comparison"].confidence, 0.2);
        assert_eq!(signals["time_decay"].confidence, 0.1);
    }

    #[test]
    fn test_empty_context_yields_nothing() {
        let mut strategy = CompositeStrategy::new(CompositeConfig::default());
        assert!(strategy.evaluate(&EvalContext::default()).is_none());
    }

    #[test]
    fn test_bullish_context_buys_yes() {
        let mut strategy = CompositeStrategy::new(CompositeConfig::default());
        let decision = strategy.evaluate(&bullish_ctx()).unwrap();
        assert_eq!(decision.action, Action::BuyYes);
        assert!(decision.score >= 0.2);
        assert!(decision.confidence >= 0.35);
        assert_eq!(decision.strategy, STRATEGY_NAME);
        assert_eq!(decision.signals.len(), 6);
        assert_eq!(strategy.buy_no_share(), 0.0);
    }

    #[test]
    fn test_expensive_entry_skipped() {
        let mut strategy = CompositeStrategy::new(CompositeConfig::default());
        let ctx = bullish_ctx().with_odds(odds(dec!(0.90), dec!(0.10)), Some(0.4), Some(0.5));
        assert!(strategy.evaluate(&ctx).is_none());
    }

    #[test]
    fn test_time_decay_window() {
        let early = EvalContext::new(Features {
            return_short: Some(0.005),
            ..Features::default()
        })
        .with_timing(800, 900);
        let s = time_decay(&early);
        assert_eq!((s.score, s.confidence), (0.0, 0.15));

        let late = early.clone().with_timing(90, 900);
        let s = time_decay(&late);
        assert!((s.score - 0.4).abs() < 1e-9);
        assert!((s.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_price_inefficiency_formula() {
        let ctx = EvalContext::new(Features {
            zscore: Some(1.0),
            ..Features::default()
        })
        .with_odds(odds(dec!(0.60), dec!(0.40)), None, None);
        // fair = 0.42, mispricing = -0.18 -> score -0.9, conf 0.61
        let s = price_inefficiency(&ctx);
        assert!((s.score + 0.9).abs() < 1e-9);
        assert!((s.confidence - 0.61).abs() < 1e-9);
    }

    #[test]
    fn test_feed_comparison() {
        let base = EvalContext::new(Features {
            return_short: Some(-0.001),
            ..Features::default()
        });
        let diverged = base.clone().with_feed_divergence(Some(8.0));
        assert_eq!(feed_comparison(&diverged).confidence, 0.05);

        let agree = base.with_feed_divergence(Some(1.0));
        let s = feed_comparison(&agree);
        assert_eq!((s.score, s.confidence), (-0.15, 0.75));
    }

    #[test]
    fn test_buy_no_streak_raises_bar() {
        let mut strategy = CompositeStrategy::new(CompositeConfig::default());
        for _ in 0..RECENT_ACTIONS {
            strategy.recent_actions.push_back(Action::BuyNo);
        }
        assert_eq!(strategy.buy_no_share(), 1.0);

        // Bearish context just above the normal bar but below bar + 0.05.
        let ctx = EvalContext::new(Features {
            return_short: Some(-0.008),
            ..Features::default()
        })
        .with_odds(odds(dec!(0.60), dec!(0.40)), Some(-0.4), Some(-0.4));
        let signals = score_signals(&ctx);
        let (score, _) = strategy.blend(&signals);
        assert!(score < -0.2 && score > -0.25, "score {score}");
        assert!(strategy.evaluate(&ctx).is_none());

        let mut fresh = CompositeStrategy::new(CompositeConfig::default());
        assert_eq!(fresh.evaluate(&ctx).map(|d| d.action), Some(Action::BuyNo));
    }

    #[test]
    fn test_config_validation() {
        assert!(CompositeConfig::default().validate().is_ok());
        let bad = CompositeConfig {
            min_confidence: 1.5,
            ..CompositeConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
