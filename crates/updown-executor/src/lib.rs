//! Paper execution for the updown engine.
//!
//! # Key Components
//!
//! - [`ExecutionSimulator`]: intent to position, with the economics gate
//! - [`costs`]: fractional-Kelly sizing, slippage, gas and edge estimates
//! - [`ExecutionConfig`]: sizing bounds and cost parameters

pub mod config;
pub mod costs;
pub mod error;
pub mod simulator;

pub use config::{ExecutionConfig, SlippageMode};
pub use costs::{CostEstimate, SlippageInputs};
pub use error::{ExecutorError, ExecutorResult};
pub use simulator::{BlockReason, Blocked, ExecutionSimulator, MarketView};
