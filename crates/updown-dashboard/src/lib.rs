//! Status snapshot, rolling event log and admin HTTP surface.
//!
//! Routes:
//! - `GET /healthz`
//! - `GET /status`: round, latest tick, last decision, kill switch, events
//! - `GET /paper-trades`: position/settlement pairs
//! - `GET|POST /admin/kill-switch`
//! - `GET /metrics`: Prometheus text exposition

mod config;
mod error;
mod events;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use events::{EventEntry, EventKind, EventLog, MATERIAL_MOVE_PCT};
pub use server::{create_router, run_server};
pub use state::DashboardState;
pub use types::{
    KillSwitchRequest, KillSwitchResponse, PaperTrade, RoundStatus, StatusSnapshot,
};
