//! Decision and intent types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trade direction on the binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    BuyYes,
    BuyNo,
    None,
}

impl Action {
    /// Whether this action opens a position.
    #[inline]
    pub fn is_trade(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Direction implied by a signed score.
    pub fn from_score(score: f64) -> Self {
        if score > 0.0 {
            Self::BuyYes
        } else if score < 0.0 {
            Self::BuyNo
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyYes => "BUY_YES",
            Self::BuyNo => "BUY_NO",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How live odds relate to a decision's direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsAlignment {
    Supportive,
    Against,
    Unknown,
}

/// One scored input to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    /// Directional score in [-1, 1]; positive favours YES.
    pub score: f64,
    pub confidence: f64,
    pub reason: String,
    pub available: bool,
}

impl SignalScore {
    pub fn new(score: f64, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            score,
            confidence,
            reason: reason.into(),
            available: true,
        }
    }

    /// Placeholder for an input that could not be computed this cycle.
    pub fn unavailable(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            confidence,
            reason: reason.into(),
            available: false,
        }
    }
}

/// Router output for one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Signed strength in [-1, 1]; used for expected-edge estimation.
    pub score: f64,
    pub reason: String,
    /// Strategy that produced the decision.
    pub strategy: String,
    pub signals: BTreeMap<String, SignalScore>,
    pub odds_alignment: OddsAlignment,
}

impl Decision {
    pub fn new(
        action: Action,
        confidence: f64,
        score: f64,
        strategy: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            confidence: confidence.clamp(0.0, 1.0),
            score: score.clamp(-1.0, 1.0),
            reason: reason.into(),
            strategy: strategy.into(),
            signals: BTreeMap::new(),
            odds_alignment: OddsAlignment::Unknown,
        }
    }

    /// A no-trade decision carrying the reason it was suppressed.
    pub fn none(reason: impl Into<String>) -> Self {
        Self::new(Action::None, 0.0, 0.0, "", reason)
    }

    #[must_use]
    pub fn with_signals(mut self, signals: BTreeMap<String, SignalScore>) -> Self {
        self.signals = signals;
        self
    }

    /// Turn this decision into a no-trade, keeping its diagnostics.
    pub fn downgrade(&mut self, reason: impl Into<String>) {
        self.action = Action::None;
        self.reason = reason.into();
    }

    #[inline]
    pub fn is_trade(&self) -> bool {
        self.action.is_trade()
    }
}

/// A decision approved by the risk guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub decision: Decision,
    pub round_id: u64,
    /// Monotonic per-round sequence, starting at 1.
    pub sequence: u32,
    /// Issue time (Unix ms).
    pub issued_at_ms: i64,
}

impl Intent {
    /// Idempotency key: unique per (round, sequence).
    pub fn key(&self) -> String {
        format!("{}-{}", self.round_id, self.sequence)
    }

    #[inline]
    pub fn action(&self) -> Action {
        self.decision.action
    }
}
