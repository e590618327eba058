//! Dashboard configuration.

use crate::error::{DashboardError, DashboardResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Serve the status/admin surface.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Events kept for `/status`.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
    /// Trade records kept for `/paper-trades`.
    #[serde(default = "default_paper_trades_capacity")]
    pub paper_trades_capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_event_log_capacity() -> usize {
    200
}

fn default_paper_trades_capacity() -> usize {
    500
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
            event_log_capacity: default_event_log_capacity(),
            paper_trades_capacity: default_paper_trades_capacity(),
        }
    }
}

impl DashboardConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn validate(&self) -> DashboardResult<()> {
        if self.event_log_capacity == 0 || self.paper_trades_capacity == 0 {
            return Err(DashboardError::ConfigError(
                "dashboard capacities must be positive".to_string(),
            ));
        }
        if self.enabled && self.bind_address.trim().is_empty() {
            return Err(DashboardError::ConfigError(
                "dashboard.bind_address is empty".to_string(),
            ));
        }
        Ok(())
    }
}
