//! Settlement error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Reference channel closed")]
    ChannelClosed,
}

pub type SettlementResult<T> = Result<T, SettlementError>;
