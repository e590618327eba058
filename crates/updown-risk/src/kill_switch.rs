//! Operator kill switch.
//!
//! A latch that suppresses new intents. It is only ever engaged or
//! cleared by an explicit administrative action; nothing clears it
//! automatically.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{error, info, warn};
use updown_telemetry::Metrics;

/// Snapshot for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillSwitchStatus {
    pub engaged: bool,
    pub reason: Option<String>,
    /// Unix ms.
    pub engaged_at_ms: Option<i64>,
}

/// Shared kill switch. Share via `Arc<KillSwitch>`.
#[derive(Debug)]
pub struct KillSwitch {
    engaged: AtomicBool,
    engaged_at_ms: AtomicI64,
    reason: RwLock<Option<String>>,
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl KillSwitch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            engaged: AtomicBool::new(false),
            engaged_at_ms: AtomicI64::new(0),
            reason: RwLock::new(None),
        }
    }

    /// Read fresh on every risk check.
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    /// Engage the switch. Returns `false` if it was already engaged, in
    /// which case the original reason is kept.
    pub fn engage(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if self
            .engaged
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.engaged_at_ms
                .store(chrono::Utc::now().timestamp_millis(), Ordering::SeqCst);
            *self.reason.write() = Some(reason.clone());
            Metrics::kill_switch(true);
            error!(%reason, "KILL SWITCH ENGAGED");
            true
        } else {
            warn!(new_reason = %reason, "Kill switch already engaged, keeping original reason");
            false
        }
    }

    /// Clear the switch. Returns `false` if it was not engaged.
    pub fn clear(&self) -> bool {
        if !self.is_engaged() {
            return false;
        }
        let previous = self.reason.write().take();
        self.engaged_at_ms.store(0, Ordering::SeqCst);
        self.engaged.store(false, Ordering::SeqCst);
        Metrics::kill_switch(false);
        info!(previous_reason = ?previous, "Kill switch cleared by operator");
        true
    }

    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if self.is_engaged() {
            self.reason.read().clone()
        } else {
            None
        }
    }

    #[must_use]
    pub fn engaged_at_ms(&self) -> Option<i64> {
        if !self.is_engaged() {
            return None;
        }
        let ts = self.engaged_at_ms.load(Ordering::SeqCst);
        (ts > 0).then_some(ts)
    }

    pub fn status(&self) -> KillSwitchStatus {
        KillSwitchStatus {
            engaged: self.is_engaged(),
            reason: self.reason(),
            engaged_at_ms: self.engaged_at_ms(),
        }
    }
}
