//! Policy gating for the updown engine.
//!
//! - `KillSwitch`: operator latch suppressing new intents
//! - `RiskGuard`: per-round trade count, cooldown and notional checks

pub mod error;
pub mod guard;
pub mod kill_switch;

pub use error::{RiskError, RiskResult};
pub use guard::{RejectReason, RiskConfig, RiskGuard, RoundCounters};
pub use kill_switch::{KillSwitch, KillSwitchStatus};
