//! Decision router.
//!
//! Runs the configured strategies in order, keeps the first trade
//! decision, adjusts its confidence by odds alignment and downgrades it
//! to NONE when it falls under the configured floors.

use crate::composite::CompositeConfig;
use crate::context::EvalContext;
use crate::error::{SignalError, SignalResult};
use crate::strategy::{Strategy, StrategyKind, StrategyParams};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use updown_core::{Decision, OddsAlignment};
use updown_telemetry::Metrics;

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Strategies in priority order.
    pub strategies: Vec<StrategyKind>,
    pub min_confidence: f64,
    /// Minimum `|score|`.
    pub min_score: f64,
    pub odds_boost: f64,
    pub odds_penalty: f64,
    #[serde(flatten)]
    pub params: StrategyParams,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategies: vec![StrategyKind::Momentum, StrategyKind::MeanReversion],
            min_confidence: 0.55,
            min_score: 0.0,
            odds_boost: 0.05,
            odds_penalty: 0.08,
            params: StrategyParams::default(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> SignalResult<()> {
        if self.strategies.is_empty() {
            return Err(SignalError::ConfigError(
                "router.strategies must name at least one strategy".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.strategies.iter().find(|k| !seen.insert(**k)) {
            return Err(SignalError::ConfigError(format!(
                "router.strategies lists {dup} more than once"
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(SignalError::ConfigError(format!(
                "router.min_confidence ({}) must be within [0, 1]",
                self.min_confidence
            )));
        }
        if self.min_score < 0.0 || self.odds_boost < 0.0 || self.odds_penalty < 0.0 {
            return Err(SignalError::ConfigError(
                "router.min_score, odds_boost and odds_penalty must be non-negative".to_string(),
            ));
        }
        self.params.validate()
    }
}

/// Produces at most one decision per evaluation cycle.
#[derive(Debug)]
pub struct DecisionRouter {
    config: RouterConfig,
    strategies: Vec<Strategy>,
}

impl DecisionRouter {
    pub fn new(config: RouterConfig, composite: &CompositeConfig) -> SignalResult<Self> {
        config.validate()?;
        if config.strategies.contains(&StrategyKind::Composite) {
            composite.validate()?;
        }
        let strategies = config
            .strategies
            .iter()
            .map(|kind| config.params.build(*kind, composite))
            .collect();
        Ok(Self { config, strategies })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn strategy_order(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(Strategy::kind).collect()
    }

    /// Evaluate all strategies and return the routed decision.
    pub fn evaluate(&mut self, ctx: &EvalContext) -> Decision {
        let mut chosen = None;
        for strategy in &mut self.strategies {
            if let Some(decision) = strategy.evaluate(ctx).filter(Decision::is_trade) {
                chosen = Some(decision);
                break;
            }
        }

        let mut decision = match chosen {
            Some(decision) => self.apply_odds(decision, ctx),
            None => Decision::none("no_strategy_signal"),
        };

        if decision.is_trade() {
            if decision.confidence < self.config.min_confidence {
                debug!(
                    strategy = %decision.strategy,
                    confidence = decision.confidence,
                    min = self.config.min_confidence,
                    "Decision below min confidence"
                );
                decision.downgrade("below_min_confidence");
            } else if decision.score.abs() < self.config.min_score {
                debug!(
                    strategy = %decision.strategy,
                    score = decision.score,
                    min = self.config.min_score,
                    "Decision below min score"
                );
                decision.downgrade("below_min_score");
            }
        }

        Metrics::decision(decision.action.as_str(), &decision.strategy);
        decision
    }

    fn apply_odds(&self, mut decision: Decision, ctx: &EvalContext) -> Decision {
        match ctx.odds.supports(decision.action) {
            Some(true) => {
                decision.odds_alignment = OddsAlignment::Supportive;
                decision.confidence = (decision.confidence + self.config.odds_boost).clamp(0.0, 1.0);
            }
            Some(false) => {
                decision.odds_alignment = OddsAlignment::Against;
                decision.confidence =
                    (decision.confidence - self.config.odds_penalty).clamp(0.0, 1.0);
            }
            None => decision.odds_alignment = OddsAlignment::Unknown,
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Features;
    use rust_decimal_macros::dec;
    use updown_core::{Action, OddsSnapshot, Price};

    fn router(strategies: Vec<StrategyKind>) -> DecisionRouter {
        DecisionRouter::new(
            RouterConfig {
                strategies,
                ..RouterConfig::default()
            },
            &CompositeConfig::default(),
        )
        .unwrap()
    }

    fn odds(yes: rust_decimal::Decimal, no: rust_decimal::Decimal) -> OddsSnapshot {
        OddsSnapshot {
            market_slug: None,
            yes_price: Some(Price::new(yes)),
            no_price: Some(Price::new(no)),
            updated_at_ms: Some(0),
        }
    }

    /// Momentum says YES, mean reversion says NO.
    fn conflicting() -> EvalContext {
        EvalContext::new(Features {
            last_price: Some(101.0),
            return_short: Some(0.004),
            zscore: Some(2.5),
            samples: 40,
        })
    }

    #[test]
    fn test_first_strategy_in_order_wins() {
        let d = router(vec![StrategyKind::Momentum, StrategyKind::MeanReversion])
            .evaluate(&conflicting());
        assert_eq!(d.action, Action::BuyYes);
        assert_eq!(d.strategy, "momentum");

        let d = router(vec![StrategyKind::MeanReversion, StrategyKind::Momentum])
            .evaluate(&conflicting());
        assert_eq!(d.action, Action::BuyNo);
        assert_eq!(d.strategy, "mean_reversion");
    }

    #[test]
    fn test_falls_through_to_next_strategy() {
        let ctx = EvalContext::new(Features {
            return_short: Some(0.0001),
            zscore: Some(-3.0),
            ..Features::default()
        });
        let d = router(vec![StrategyKind::Momentum, StrategyKind::MeanReversion]).evaluate(&ctx);
        assert_eq!(d.action, Action::BuyYes);
        assert_eq!(d.strategy, "mean_reversion");
    }

    #[test]
    fn test_no_signal_is_none() {
        let d = router(vec![StrategyKind::Momentum]).evaluate(&EvalContext::default());
        assert_eq!(d.action, Action::None);
        assert_eq!(d.reason, "no_strategy_signal");
    }

    #[test]
    fn test_supportive_odds_boost() {
        let ctx = conflicting().with_odds(odds(dec!(0.6), dec!(0.4)), None, None);
        let d = router(vec![StrategyKind::Momentum]).evaluate(&ctx);
        assert_eq!(d.odds_alignment, OddsAlignment::Supportive);
        assert!((d.confidence - 0.67).abs() < 1e-9);
        assert!(d.is_trade());
    }

    #[test]
    fn test_against_odds_penalty_downgrades() {
        // 0.62 - 0.08 = 0.54 < 0.55
        let ctx = conflicting().with_odds(odds(dec!(0.4), dec!(0.6)), None, None);
        let d = router(vec![StrategyKind::Momentum]).evaluate(&ctx);
        assert_eq!(d.odds_alignment, OddsAlignment::Against);
        assert_eq!(d.action, Action::None);
        assert_eq!(d.reason, "below_min_confidence");
        assert_eq!(d.strategy, "momentum");
    }

    #[test]
    fn test_missing_odds_unknown_alignment() {
        let d = router(vec![StrategyKind::Momentum]).evaluate(&conflicting());
        assert_eq!(d.odds_alignment, OddsAlignment::Unknown);
        assert_eq!(d.confidence, 0.62);
    }

    #[test]
    fn test_min_score_downgrade() {
        let mut r = DecisionRouter::new(
            RouterConfig {
                strategies: vec![StrategyKind::Momentum],
                min_score: 0.5,
                ..RouterConfig::default()
            },
            &CompositeConfig::default(),
        )
        .unwrap();
        let d = r.evaluate(&conflicting());
        assert_eq!(d.reason, "below_min_score");
        assert!(!d.is_trade());
    }

    #[test]
    fn test_config_validation() {
        let empty = RouterConfig {
            strategies: vec![],
            ..RouterConfig::default()
        };
        assert!(empty.validate().is_err());

        let dup = RouterConfig {
            strategies: vec![StrategyKind::Momentum, StrategyKind::Momentum],
            ..RouterConfig::default()
        };
        assert!(dup.validate().is_err());

        let bad_conf = RouterConfig {
            min_confidence: -0.1,
            ..RouterConfig::default()
        };
        assert!(bad_conf.validate().is_err());
    }
}
