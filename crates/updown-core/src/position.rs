//! Paper position and settlement records.

use crate::{Action, Price, Usd};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Position
// ============================================================================

/// Position identifier, derived from the intent idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A costed paper position opened against an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub round_id: u64,
    pub action: Action,
    /// Held-token reference price at entry, before slippage.
    pub entry_price: Price,
    pub notional_usd: Usd,
    pub slippage_bps: Decimal,
    /// Round-trip gas fee.
    pub fee_usd: Usd,
    pub adverse_selection_bps: Decimal,
    pub expected_edge_bps: Decimal,
    /// slippage + gas equivalent + adverse selection.
    pub total_cost_bps: Decimal,
    pub confidence: f64,
    pub score: f64,
    pub strategy: String,
    /// Underlying asset price when the position was opened.
    pub reference_price_at_entry: Option<Price>,
    /// Open time (Unix ms).
    pub opened_at_ms: i64,
}

// ============================================================================
// PriceToBeat
// ============================================================================

/// Reference tier that satisfied price-to-beat resolution.
///
/// Lower rank wins when several tiers have data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceToBeatTier {
    /// Independent historical candle at round open.
    HistoricalCandle,
    /// Exchange kline at round open.
    ExchangeKline,
    /// Last live tick observed before round open.
    LastTickBeforeOpen,
    /// First live tick observed in the round.
    OpeningTick,
}

impl PriceToBeatTier {
    /// All tiers in precedence order.
    pub const ALL: [PriceToBeatTier; 4] = [
        Self::HistoricalCandle,
        Self::ExchangeKline,
        Self::LastTickBeforeOpen,
        Self::OpeningTick,
    ];

    /// 1-based rank recorded for audit.
    pub fn rank(&self) -> u8 {
        match self {
            Self::HistoricalCandle => 1,
            Self::ExchangeKline => 2,
            Self::LastTickBeforeOpen => 3,
            Self::OpeningTick => 4,
        }
    }
}

impl fmt::Display for PriceToBeatTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HistoricalCandle => "historical_candle",
            Self::ExchangeKline => "exchange_kline",
            Self::LastTickBeforeOpen => "last_tick_before_open",
            Self::OpeningTick => "opening_tick",
        };
        write!(f, "{}(tier {})", name, self.rank())
    }
}

/// Resolved reference price for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceToBeat {
    pub value: Price,
    pub source_rank: PriceToBeatTier,
    /// Resolution time (Unix ms).
    pub resolved_at_ms: i64,
}

// ============================================================================
// Settlement
// ============================================================================

/// Binary outcome of a settled position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Invalid,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved outcome and PnL of a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub position_id: PositionId,
    pub round_id: u64,
    pub action: Action,
    pub outcome: Outcome,
    pub entry_price: Price,
    /// Held-token payout: 1 on win, 0 on loss, entry price on invalid.
    pub exit_price: Price,
    /// Underlying asset close price.
    pub close_price: Option<Price>,
    pub price_to_beat: Option<PriceToBeat>,
    pub return_pct: Decimal,
    pub gross_pnl_usd: Usd,
    pub total_cost_usd: Usd,
    pub net_pnl_usd: Usd,
    /// Why an `invalid` outcome was assigned.
    pub invalid_reason: Option<String>,
    /// Settlement time (Unix ms).
    pub closed_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_precedence_order() {
        let ranks: Vec<u8> = PriceToBeatTier::ALL.iter().map(|t| t.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert!(PriceToBeatTier::HistoricalCandle < PriceToBeatTier::OpeningTick);
    }

    #[test]
    fn test_outcome_serde() {
        assert_eq!(serde_json::to_string(&Outcome::Invalid).unwrap(), "\"invalid\"");
    }
}
