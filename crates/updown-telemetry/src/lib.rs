//! Prometheus metrics and structured logging for the updown engine.
//!
//! - Prometheus metrics for feeds, decisions, risk gates and settlements
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
