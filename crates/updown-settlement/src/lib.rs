//! Settlement for paper positions.
//!
//! - `PriceToBeatBook`: tiered price-to-beat resolution, immutable once set
//! - `pnl`: outcome and held-token PnL math
//! - `SettlementEngine`: per-round settlement with a grace period and
//!   idempotent records
//! - `DailyTotalsBook`: per-UTC-day totals

pub mod daily;
pub mod engine;
pub mod error;
pub mod pnl;
pub mod price_to_beat;

pub use daily::{DailyTotals, DailyTotalsBook};
pub use engine::{RoundPriceSource, SettlementConfig, SettlementEngine, ORPHANED_ON_RESTART};
pub use error::{SettlementError, SettlementResult};
pub use pnl::{compute_pnl, decide_outcome, exit_price, settle_position, Pnl};
pub use price_to_beat::{
    resolve_price_to_beat, PriceToBeatBook, PriceToBeatInputs, ReferenceReport, ReferenceSender,
};
