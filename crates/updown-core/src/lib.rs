//! Core domain types for the updown round-lifecycle engine.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `Tick`, `FeedSource`: normalized market data
//! - `Round`, `RoundClock`: wall-clock round identity and edge-triggered transitions
//! - `Decision`, `Intent`: router output and policy-approved trade candidates
//! - `Position`, `Settlement`, `PriceToBeat`: paper trade lifecycle records
//! - `Price`, `Usd`: precision-safe numeric types

pub mod decimal;
pub mod decision;
pub mod error;
pub mod position;
pub mod round;
pub mod types;

pub use decimal::{Price, Usd, BPS_DIVISOR};
pub use decision::{Action, Decision, Intent, OddsAlignment, SignalScore};
pub use error::{CoreError, Result};
pub use position::{Outcome, Position, PositionId, PriceToBeat, PriceToBeatTier, Settlement};
pub use round::{Round, RoundClock, RoundPhase, RoundSchedule, RoundTransition};
pub use types::{Candle, FeedSource, OddsSnapshot, Tick};
