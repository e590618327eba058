//! Strategy modules.
//!
//! The set is closed: momentum, mean reversion and the composite scorer.
//! Each returns `None` when it has nothing to say this cycle.

use crate::composite::{CompositeConfig, CompositeStrategy};
use crate::context::EvalContext;
use crate::error::{SignalError, SignalResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use updown_core::{Action, Decision};

/// Strategy identifier as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Momentum,
    MeanReversion,
    Composite,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Momentum => "momentum",
            Self::MeanReversion => "mean_reversion",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Momentum
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// Absolute short return needed to fire.
    pub threshold: f64,
    pub confidence: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0012,
            confidence: 0.62,
        }
    }
}

/// Follows the short-horizon return.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    config: MomentumConfig,
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> Option<Decision> {
        let ret = ctx.features.return_short?;
        let action = if ret > self.config.threshold {
            Action::BuyYes
        } else if ret < -self.config.threshold {
            Action::BuyNo
        } else {
            return None;
        };
        let reason = if action == Action::BuyYes {
            "short_return_up"
        } else {
            "short_return_down"
        };
        Some(Decision::new(
            action,
            self.config.confidence,
            (ret * 50.0).clamp(-1.0, 1.0),
            StrategyKind::Momentum.as_str(),
            reason,
        ))
    }
}

// ============================================================================
// Mean reversion
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionConfig {
    /// Absolute z-score needed to fire.
    pub zscore_threshold: f64,
    pub confidence: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: 1.75,
            confidence: 0.57,
        }
    }
}

/// Fades stretched prices back toward the window mean.
#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> Option<Decision> {
        let z = ctx.features.zscore?;
        let (action, reason) = if z > self.config.zscore_threshold {
            (Action::BuyNo, "stretched_above_mean")
        } else if z < -self.config.zscore_threshold {
            (Action::BuyYes, "stretched_below_mean")
        } else {
            return None;
        };
        Some(Decision::new(
            action,
            self.config.confidence,
            (-z / 4.0).clamp(-1.0, 1.0),
            StrategyKind::MeanReversion.as_str(),
            reason,
        ))
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// A configured strategy module.
#[derive(Debug, Clone)]
pub enum Strategy {
    Momentum(MomentumStrategy),
    MeanReversion(MeanReversionStrategy),
    Composite(CompositeStrategy),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Momentum(_) => StrategyKind::Momentum,
            Self::MeanReversion(_) => StrategyKind::MeanReversion,
            Self::Composite(_) => StrategyKind::Composite,
        }
    }

    /// Evaluate against the current context. The composite scorer keeps
    /// history, hence `&mut self`.
    pub fn evaluate(&mut self, ctx: &EvalContext) -> Option<Decision> {
        match self {
            Self::Momentum(s) => s.evaluate(ctx),
            Self::MeanReversion(s) => s.evaluate(ctx),
            Self::Composite(s) => s.evaluate(ctx),
        }
    }
}

/// Per-strategy parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub momentum: MomentumConfig,
    pub mean_reversion: MeanReversionConfig,
}

impl StrategyParams {
    pub fn validate(&self) -> SignalResult<()> {
        if self.momentum.threshold <= 0.0 {
            return Err(SignalError::ConfigError(
                "momentum.threshold must be positive".to_string(),
            ));
        }
        if self.mean_reversion.zscore_threshold <= 0.0 {
            return Err(SignalError::ConfigError(
                "mean_reversion.zscore_threshold must be positive".to_string(),
            ));
        }
        for (name, c) in [
            ("momentum.confidence", self.momentum.confidence),
            ("mean_reversion.confidence", self.mean_reversion.confidence),
        ] {
            if !(0.0..=1.0).contains(&c) {
                return Err(SignalError::ConfigError(format!(
                    "{name} ({c}) must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Instantiate the module for `kind`.
    pub fn build(&self, kind: StrategyKind, composite: &CompositeConfig) -> Strategy {
        match kind {
            StrategyKind::Momentum => Strategy::Momentum(MomentumStrategy::new(self.momentum.clone())),
            StrategyKind::MeanReversion => {
                Strategy::MeanReversion(MeanReversionStrategy::new(self.mean_reversion.clone()))
            }
            StrategyKind::Composite => {
                Strategy::Composite(CompositeStrategy::new(composite.clone()))
            }
        }
    }
}
