//! Audit record types.

use serde::{Deserialize, Serialize};
use updown_core::{Action, Position, Price, Settlement};

/// A decision that cleared the router, logged whether or not it traded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub timestamp_ms: i64,
    pub round_id: u64,
    pub action: Action,
    pub confidence: f64,
    pub score: f64,
    pub strategy: String,
    pub reason: String,
    pub yes_price: Option<Price>,
    pub no_price: Option<Price>,
    pub seconds_to_close: i64,
}

/// Significant outcome-token price move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMoveRecord {
    pub timestamp_ms: i64,
    pub round_id: u64,
    pub market_slug: Option<String>,
    pub yes_from: Option<Price>,
    pub yes_to: Option<Price>,
    pub no_from: Option<Price>,
    pub no_to: Option<Price>,
    /// Underlying reference price when the move was seen.
    pub reference_price: Option<Price>,
}

/// One line of the paper log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaperRecord {
    PositionOpened(Position),
    PositionSettled(Settlement),
    Opportunity(OpportunityRecord),
    PriceMove(PriceMoveRecord),
}

impl PaperRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PositionOpened(_) => "position_opened",
            Self::PositionSettled(_) => "position_settled",
            Self::Opportunity(_) => "opportunity",
            Self::PriceMove(_) => "price_move",
        }
    }

    pub fn round_id(&self) -> u64 {
        match self {
            Self::PositionOpened(p) => p.round_id,
            Self::PositionSettled(s) => s.round_id,
            Self::Opportunity(o) => o.round_id,
            Self::PriceMove(m) => m.round_id,
        }
    }
}
