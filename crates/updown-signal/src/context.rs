//! Inputs to one evaluation cycle.

use crate::state::Features;
use updown_core::OddsSnapshot;

/// Everything a strategy may look at.
///
/// Built by the evaluation loop from the signal state, the round clock
/// and the odds book. Missing inputs are `None`; strategies degrade
/// rather than fail.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub features: Features,
    pub seconds_to_close: Option<i64>,
    pub round_secs: Option<i64>,
    pub odds: OddsSnapshot,
    pub orderbook_imbalance: Option<f64>,
    pub trade_momentum: Option<f64>,
    /// Primary vs secondary feed divergence, in bps.
    pub feed_divergence_bps: Option<f64>,
}

impl EvalContext {
    pub fn new(features: Features) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timing(mut self, seconds_to_close: i64, round_secs: i64) -> Self {
        self.seconds_to_close = Some(seconds_to_close);
        self.round_secs = Some(round_secs);
        self
    }

    #[must_use]
    pub fn with_odds(
        mut self,
        odds: OddsSnapshot,
        orderbook_imbalance: Option<f64>,
        trade_momentum: Option<f64>,
    ) -> Self {
        self.odds = odds;
        self.orderbook_imbalance = orderbook_imbalance;
        self.trade_momentum = trade_momentum;
        self
    }

    #[must_use]
    pub fn with_feed_divergence(mut self, bps: Option<f64>) -> Self {
        self.feed_divergence_bps = bps;
        self
    }

    /// Time-to-close as a fraction of the round elapsed: 0 at open, 1 at close.
    pub fn closeness(&self) -> Option<f64> {
        let (secs, round) = (self.seconds_to_close?, self.round_secs?);
        Some(1.0 - (secs as f64 / round.max(1) as f64).clamp(0.0, 1.0))
    }
}
