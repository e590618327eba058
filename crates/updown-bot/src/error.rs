//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] updown_core::CoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] updown_feed::FeedError),

    #[error("Signal error: {0}")]
    Signal(#[from] updown_signal::SignalError),

    #[error("Risk error: {0}")]
    Risk(#[from] updown_risk::RiskError),

    #[error("Executor error: {0}")]
    Executor(#[from] updown_executor::ExecutorError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] updown_settlement::SettlementError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] updown_persistence::PersistenceError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] updown_dashboard::DashboardError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] updown_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
