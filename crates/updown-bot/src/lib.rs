//! Up/down round decision engine.
//!
//! Orchestrates the round lifecycle for a binary up/down market:
//! - price and odds feeds into a shared [`FeedHub`]
//! - per-round decisions, risk gating and paper execution ([`Engine`])
//! - settlement against the round's price-to-beat
//! - the audit log and the status dashboard

pub mod app;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod reference;

pub use app::Application;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use engine::{CycleReport, Engine};
pub use error::{AppError, AppResult};
pub use hub::FeedHub;
pub use reference::{HttpReferenceFetcher, ReferenceFetcher};
