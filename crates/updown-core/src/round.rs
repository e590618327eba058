//! Round clock.
//!
//! Rounds are fixed-duration windows aligned to the Unix epoch:
//! - `round_id = floor(now / duration)`
//! - `open_ts = round_id * duration`, `close_ts = open_ts + duration`
//! - a round is active once `now >= close_ts - activation_lead`
//!
//! `RoundClock::poll` turns the polled wall clock into edge-triggered
//! `RoundActivated` / `RoundClosed` transitions, each emitted exactly once
//! per round regardless of polling frequency.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Round duration and activation lead, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSchedule {
    duration_secs: i64,
    activation_lead_secs: i64,
}

impl RoundSchedule {
    /// Validate and build a schedule.
    pub fn new(duration_secs: i64, activation_lead_secs: i64) -> Result<Self> {
        if duration_secs <= 0 {
            return Err(CoreError::InvalidSchedule(format!(
                "round duration must be > 0, got {duration_secs}"
            )));
        }
        if activation_lead_secs < 0 || activation_lead_secs > duration_secs {
            return Err(CoreError::InvalidSchedule(format!(
                "activation lead must be within [0, {duration_secs}], got {activation_lead_secs}"
            )));
        }
        Ok(Self {
            duration_secs,
            activation_lead_secs,
        })
    }

    #[inline]
    pub fn duration_secs(&self) -> i64 {
        self.duration_secs
    }

    #[inline]
    pub fn activation_lead_secs(&self) -> i64 {
        self.activation_lead_secs
    }

    /// Round containing `now_ms`.
    #[must_use]
    pub fn current_round(&self, now_ms: i64) -> Round {
        let duration_ms = self.duration_secs * 1000;
        let round_id = now_ms.max(0).div_euclid(duration_ms) as u64;
        self.round(round_id)
    }

    /// Round with the given id.
    #[must_use]
    pub fn round(&self, round_id: u64) -> Round {
        let open_ts = round_id as i64 * self.duration_secs;
        Round {
            round_id,
            open_ts,
            close_ts: open_ts + self.duration_secs,
            activation_lead_secs: self.activation_lead_secs,
        }
    }
}

/// One fixed-duration market window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Round {
    pub round_id: u64,
    /// Unix seconds.
    pub open_ts: i64,
    /// Unix seconds.
    pub close_ts: i64,
    pub activation_lead_secs: i64,
}

impl Round {
    /// Start of the activation window (Unix seconds).
    #[inline]
    pub fn activation_ts(&self) -> i64 {
        self.close_ts - self.activation_lead_secs
    }

    /// Inside the activation window.
    #[must_use]
    pub fn is_active(&self, now_ms: i64) -> bool {
        now_ms >= self.activation_ts() * 1000
    }

    /// Past the close.
    #[must_use]
    pub fn is_closed(&self, now_ms: i64) -> bool {
        now_ms >= self.close_ts * 1000
    }

    /// Whole seconds until close, floored at zero.
    #[must_use]
    pub fn seconds_to_close(&self, now_ms: i64) -> i64 {
        ((self.close_ts * 1000 - now_ms) / 1000).max(0)
    }

    #[inline]
    pub fn duration_secs(&self) -> i64 {
        self.close_ts - self.open_ts
    }

    #[inline]
    pub fn open_ms(&self) -> i64 {
        self.open_ts * 1000
    }

    #[inline]
    pub fn close_ms(&self) -> i64 {
        self.close_ts * 1000
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round#{}[{}..{})", self.round_id, self.open_ts, self.close_ts)
    }
}

/// Last-seen lifecycle state of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// No round has been activated since startup.
    Unstarted,
    /// Round is inside its activation window.
    Active(u64),
    /// Round has closed; waiting for the next activation.
    Closed(u64),
}

/// Edge-triggered round lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTransition {
    Activated(Round),
    Closed(Round),
}

/// Polled clock emitting exactly-once round transitions.
#[derive(Debug, Clone)]
pub struct RoundClock {
    schedule: RoundSchedule,
    phase: RoundPhase,
}

impl RoundClock {
    pub fn new(schedule: RoundSchedule) -> Self {
        Self {
            schedule,
            phase: RoundPhase::Unstarted,
        }
    }

    #[inline]
    pub fn schedule(&self) -> &RoundSchedule {
        &self.schedule
    }

    #[inline]
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Currently active round, if any.
    pub fn active_round(&self) -> Option<Round> {
        match self.phase {
            RoundPhase::Active(id) => Some(self.schedule.round(id)),
            _ => None,
        }
    }

    /// Advance the clock to `now_ms`.
    ///
    /// Returns at most one `Closed` followed by at most one `Activated`.
    /// Time moving backwards never re-emits a transition.
    pub fn poll(&mut self, now_ms: i64) -> Vec<RoundTransition> {
        let mut transitions = Vec::with_capacity(2);

        if let RoundPhase::Active(id) = self.phase {
            let active = self.schedule.round(id);
            if active.is_closed(now_ms) {
                self.phase = RoundPhase::Closed(id);
                transitions.push(RoundTransition::Closed(active));
            }
        }

        let current = self.schedule.current_round(now_ms);
        let newer = match self.phase {
            RoundPhase::Unstarted => true,
            RoundPhase::Active(id) | RoundPhase::Closed(id) => current.round_id > id,
        };
        if newer && current.is_active(now_ms) {
            self.phase = RoundPhase::Active(current.round_id);
            transitions.push(RoundTransition::Activated(current));
        }

        transitions
    }
}
