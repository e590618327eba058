//! Wire types for the status and admin surface.

use crate::events::EventEntry;
use serde::{Deserialize, Serialize};
use updown_core::{Decision, OddsSnapshot, Position, PriceToBeat, Round, Settlement, Tick};
use updown_risk::KillSwitchStatus;
use updown_settlement::DailyTotals;

/// Current round identity and timing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundStatus {
    pub round_id: u64,
    pub open_ts: i64,
    pub close_ts: i64,
    pub seconds_to_close: i64,
    pub active: bool,
    pub price_to_beat: Option<PriceToBeat>,
}

impl RoundStatus {
    pub fn from_round(round: &Round, now_ms: i64, price_to_beat: Option<PriceToBeat>) -> Self {
        Self {
            round_id: round.round_id,
            open_ts: round.open_ts,
            close_ts: round.close_ts,
            seconds_to_close: round.seconds_to_close(now_ms),
            active: round.is_active(now_ms),
            price_to_beat,
        }
    }
}

/// `GET /status` body.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub timestamp_ms: i64,
    pub round: Option<RoundStatus>,
    pub latest_tick: Option<Tick>,
    pub last_decision: Option<Decision>,
    pub odds: Option<OddsSnapshot>,
    pub kill_switch: KillSwitchStatus,
    pub open_positions: usize,
    pub today: Option<DailyTotals>,
    pub events: Vec<EventEntry>,
}

/// A position paired with its settlement once the round resolves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperTrade {
    pub position: Position,
    pub settlement: Option<Settlement>,
}

/// `POST /admin/kill-switch` body.
#[derive(Debug, Clone, Deserialize)]
pub struct KillSwitchRequest {
    pub enabled: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Kill-switch state as exposed on the admin route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillSwitchResponse {
    pub enabled: bool,
    pub reason: Option<String>,
    pub engaged_at_ms: Option<i64>,
}

impl From<KillSwitchStatus> for KillSwitchResponse {
    fn from(status: KillSwitchStatus) -> Self {
        Self {
            enabled: status.engaged,
            reason: status.reason,
            engaged_at_ms: status.engaged_at_ms,
        }
    }
}
