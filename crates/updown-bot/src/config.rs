//! Application configuration.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use updown_core::{FeedSource, RoundSchedule};
use updown_dashboard::DashboardConfig;
use updown_executor::ExecutionConfig;
use updown_feed::{
    parse_window_secs, Backoff, ChainlinkCredentials, WsConfig, DEFAULT_GAMMA_BASE_URL,
    DEFAULT_KLINE_BASE_URL,
};
use updown_risk::RiskConfig;
use updown_settlement::SettlementConfig;
use updown_signal::{CompositeConfig, RouterConfig};

// ============================================================================
// Clock
// ============================================================================

/// Round timing and evaluation cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_round_seconds")]
    pub round_seconds: i64,
    #[serde(default = "default_activation_lead_seconds")]
    pub activation_lead_seconds: i64,
    /// Use the short test-mode round instead.
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default = "default_test_round_seconds")]
    pub test_round_seconds: i64,
    #[serde(default = "default_test_activation_lead_seconds")]
    pub test_activation_lead_seconds: i64,
    /// Evaluation loop period (ms).
    #[serde(default = "default_eval_interval_ms")]
    pub eval_interval_ms: u64,
}

fn default_round_seconds() -> i64 {
    900
}

fn default_activation_lead_seconds() -> i64 {
    180
}

fn default_test_round_seconds() -> i64 {
    120
}

fn default_test_activation_lead_seconds() -> i64 {
    100
}

fn default_eval_interval_ms() -> u64 {
    500
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            round_seconds: default_round_seconds(),
            activation_lead_seconds: default_activation_lead_seconds(),
            test_mode: false,
            test_round_seconds: default_test_round_seconds(),
            test_activation_lead_seconds: default_test_activation_lead_seconds(),
            eval_interval_ms: default_eval_interval_ms(),
        }
    }
}

impl ClockConfig {
    /// (round seconds, activation lead) after applying test mode.
    pub fn effective(&self) -> (i64, i64) {
        if self.test_mode {
            (self.test_round_seconds, self.test_activation_lead_seconds)
        } else {
            (self.round_seconds, self.activation_lead_seconds)
        }
    }

    pub fn schedule(&self) -> AppResult<RoundSchedule> {
        let (duration, lead) = self.effective();
        Ok(RoundSchedule::new(duration, lead)?)
    }

    pub fn eval_interval(&self) -> Duration {
        Duration::from_millis(self.eval_interval_ms)
    }
}

// ============================================================================
// Primary market-data feed
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_source")]
    pub source: FeedSource,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Required for `custom`; derived from the symbol for `binance`.
    #[serde(default)]
    pub url: Option<String>,
    /// Age after which the feed is reported stale (ms).
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
    /// Candle window, e.g. `15m`.
    #[serde(default = "default_candle_window")]
    pub candle_window: String,
}

fn default_feed_source() -> FeedSource {
    FeedSource::Binance
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_stale_after_ms() -> u64 {
    10_000
}

fn default_ping_interval_ms() -> u64 {
    15_000
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_candle_window() -> String {
    "15m".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: default_feed_source(),
            symbol: default_symbol(),
            url: None,
            stale_after_ms: default_stale_after_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            backoff: Backoff::default(),
            candle_window: default_candle_window(),
        }
    }
}

impl FeedConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// WebSocket settings for the `binance` and `custom` sources.
    pub fn ws_config(&self) -> AppResult<WsConfig> {
        let (url, subscribe) = match self.source {
            FeedSource::Binance => (
                self.url.clone().unwrap_or_else(|| {
                    format!(
                        "wss://stream.binance.com:9443/ws/{}@trade",
                        self.symbol.to_lowercase()
                    )
                }),
                None,
            ),
            FeedSource::Custom => {
                let url = self.url.clone().ok_or_else(|| {
                    AppError::Config("feed.url is required for the custom source".to_string())
                })?;
                let subscribe = serde_json::json!({
                    "type": "subscribe",
                    "channel": "ticker",
                    "symbol": self.symbol,
                });
                (url, Some(subscribe.to_string()))
            }
            FeedSource::Chainlink => {
                return Err(AppError::Config(
                    "the chainlink source streams over HTTP, not WebSocket".to_string(),
                ))
            }
        };
        Ok(WsConfig {
            label: self.source.as_str().to_string(),
            url,
            subscribe,
            ping_interval_ms: self.ping_interval_ms,
            idle_timeout_ms: self.idle_timeout_ms,
            backoff: self.backoff,
        })
    }
}

// ============================================================================
// Odds feed
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsConfig {
    #[serde(default = "default_odds_enabled")]
    pub enabled: bool,
    #[serde(default = "default_gamma_base_url")]
    pub gamma_base_url: String,
    #[serde(default = "default_odds_ws_url")]
    pub ws_url: String,
    /// Market slug prefix; the window timestamp is appended.
    #[serde(default = "default_slug_prefix")]
    pub slug_prefix: String,
    #[serde(default = "default_market_refresh_seconds")]
    pub market_refresh_seconds: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_odds_enabled() -> bool {
    true
}

fn default_gamma_base_url() -> String {
    DEFAULT_GAMMA_BASE_URL.to_string()
}

fn default_odds_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_slug_prefix() -> String {
    "btc-updown-15m".to_string()
}

fn default_market_refresh_seconds() -> u64 {
    12
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            enabled: default_odds_enabled(),
            gamma_base_url: default_gamma_base_url(),
            ws_url: default_odds_ws_url(),
            slug_prefix: default_slug_prefix(),
            market_refresh_seconds: default_market_refresh_seconds(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

// ============================================================================
// Reference prices
// ============================================================================

/// Price-to-beat lookups and the optional oracle stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Oracle endpoint; falls back to `CHAINLINK_BASE_URL`.
    #[serde(default)]
    pub chainlink_base_url: Option<String>,
    /// Falls back to `CHAINLINK_LOGIN`.
    #[serde(default)]
    pub chainlink_login: Option<String>,
    /// Falls back to `CHAINLINK_PASSWORD`.
    #[serde(default, skip_serializing)]
    pub chainlink_password: Option<String>,
    #[serde(default = "default_chainlink_symbol")]
    pub chainlink_symbol: String,
    /// Fetch exchange klines for the price to beat.
    #[serde(default = "default_kline_enabled")]
    pub kline_enabled: bool,
    #[serde(default = "default_kline_base_url")]
    pub kline_base_url: String,
    #[serde(default = "default_symbol")]
    pub kline_symbol: String,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Run the oracle as a secondary stream for feed comparison.
    #[serde(default)]
    pub stream_oracle: bool,
    /// Source whose ticks settle rounds. Defaults to the primary feed.
    #[serde(default)]
    pub settlement_source: Option<FeedSource>,
}

fn default_chainlink_symbol() -> String {
    "BTCUSD".to_string()
}

fn default_kline_enabled() -> bool {
    true
}

fn default_kline_base_url() -> String {
    DEFAULT_KLINE_BASE_URL.to_string()
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            chainlink_base_url: None,
            chainlink_login: None,
            chainlink_password: None,
            chainlink_symbol: default_chainlink_symbol(),
            kline_enabled: default_kline_enabled(),
            kline_base_url: default_kline_base_url(),
            kline_symbol: default_symbol(),
            http_timeout_ms: default_http_timeout_ms(),
            stream_oracle: false,
            settlement_source: None,
        }
    }
}

impl ReferenceConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Oracle credentials from config, then environment. `None` when any
    /// part is missing.
    pub fn chainlink_credentials(&self) -> Option<ChainlinkCredentials> {
        fn pick(value: &Option<String>, env: &str) -> Option<String> {
            value
                .clone()
                .or_else(|| std::env::var(env).ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        Some(ChainlinkCredentials {
            base_url: pick(&self.chainlink_base_url, "CHAINLINK_BASE_URL")?,
            login: pick(&self.chainlink_login, "CHAINLINK_LOGIN")?,
            password: pick(&self.chainlink_password, "CHAINLINK_PASSWORD")?,
        })
    }
}

// ============================================================================
// Paper log / telemetry
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperLogConfig {
    #[serde(default = "default_paper_log_enabled")]
    pub enabled: bool,
    #[serde(default = "default_paper_log_path")]
    pub path: String,
    /// Records buffered before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_paper_log_enabled() -> bool {
    true
}

fn default_paper_log_path() -> String {
    "data/paper_trades.jsonl".to_string()
}

fn default_buffer_size() -> usize {
    1
}

impl Default for PaperLogConfig {
    fn default() -> Self {
        Self {
            enabled: default_paper_log_enabled(),
            path: default_paper_log_path(),
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub odds: OddsConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub composite: CompositeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub paper_log: PaperLogConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Source whose ticks settle rounds.
    pub fn settlement_source(&self) -> FeedSource {
        self.reference.settlement_source.unwrap_or(self.feed.source)
    }

    /// Secondary source for feed comparison, if one is streamed.
    pub fn secondary_source(&self) -> Option<FeedSource> {
        (self.reference.stream_oracle && self.feed.source != FeedSource::Chainlink)
            .then_some(FeedSource::Chainlink)
    }

    /// Reject contradictory or unusable settings.
    pub fn validate(&self) -> AppResult<()> {
        let (round_secs, lead) = self.clock.effective();
        if round_secs <= 0 {
            return Err(AppError::Config(format!(
                "round duration must be positive, got {round_secs}"
            )));
        }
        if lead <= 0 || lead > round_secs {
            return Err(AppError::Config(format!(
                "activation lead ({lead}s) must be within (0, {round_secs}]"
            )));
        }
        if self.clock.eval_interval_ms == 0 {
            return Err(AppError::Config(
                "clock.eval_interval_ms must be positive".to_string(),
            ));
        }
        if self.feed.stale_after_ms == 0 {
            return Err(AppError::Config(
                "feed.stale_after_ms must be positive".to_string(),
            ));
        }
        if self.feed.symbol.trim().is_empty() {
            return Err(AppError::Config("feed.symbol must not be empty".to_string()));
        }
        parse_window_secs(&self.feed.candle_window)?;

        match self.feed.source {
            FeedSource::Custom if self.feed.url.is_none() => {
                return Err(AppError::Config(
                    "feed.url is required for the custom source".to_string(),
                ));
            }
            FeedSource::Chainlink if self.reference.chainlink_credentials().is_none() => {
                return Err(AppError::Config(
                    "chainlink source needs base url, login and password".to_string(),
                ));
            }
            _ => {}
        }
        if self.reference.stream_oracle && self.reference.chainlink_credentials().is_none() {
            return Err(AppError::Config(
                "reference.stream_oracle needs chainlink credentials".to_string(),
            ));
        }
        if let Some(source) = self.reference.settlement_source {
            if source != self.feed.source && self.secondary_source() != Some(source) {
                return Err(AppError::Config(format!(
                    "reference.settlement_source {source} is not streamed"
                )));
            }
        }

        if self.odds.enabled && self.odds.market_refresh_seconds == 0 {
            return Err(AppError::Config(
                "odds.market_refresh_seconds must be positive".to_string(),
            ));
        }

        if self.execution.min_trade_usd > self.execution.max_trade_usd {
            return Err(AppError::Config(format!(
                "execution.min_trade_usd ({}) exceeds max_trade_usd ({})",
                self.execution.min_trade_usd, self.execution.max_trade_usd
            )));
        }
        if let Some(cap) = self.risk.max_round_notional_usd {
            if cap < self.execution.min_trade_usd || cap <= Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "risk.max_round_notional_usd ({cap}) is below the minimum trade size"
                )));
            }
        }

        self.router.validate()?;
        self.composite.validate()?;
        self.risk.validate()?;
        self.execution.validate()?;
        self.settlement.validate()?;
        self.dashboard.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.clock.effective(), (900, 180));
        assert_eq!(config.settlement_source(), FeedSource::Binance);
        assert!(config.secondary_source().is_none());
    }

    #[test]
    fn test_test_mode_shortens_rounds() {
        let config = AppConfig::from_toml("[clock]\ntest_mode = true\n").unwrap();
        let schedule = config.clock.schedule().unwrap();
        assert_eq!(schedule.duration_secs(), 120);
        assert_eq!(schedule.activation_lead_secs(), 100);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [risk]
            max_trades_per_round = 3

            [dashboard]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.risk.max_trades_per_round, 3);
        assert_eq!(config.risk.cooldown_seconds, 8);
        assert_eq!(config.dashboard.port, 9000);
        assert_eq!(config.settlement.grace_seconds, 30);
        assert_eq!(config.paper_log.path, "data/paper_trades.jsonl");
    }

    #[test]
    fn test_rejects_lead_longer_than_round() {
        let err = AppConfig::from_toml(
            "[clock]\nround_seconds = 300\nactivation_lead_seconds = 301\n",
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_rejects_inverted_trade_bounds() {
        let mut config = AppConfig::default();
        config.execution.min_trade_usd = dec!(60);
        config.execution.max_trade_usd = dec!(50);
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_empty_strategy_order() {
        let err = AppConfig::from_toml("[router]\nstrategies = []\n").unwrap_err();
        assert!(matches!(err, AppError::Signal(_)));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let err = AppConfig::from_toml("[router]\nmin_confidence = 1.5\n").unwrap_err();
        assert!(matches!(err, AppError::Signal(_)));
    }

    #[test]
    fn test_custom_feed_needs_url() {
        let err = AppConfig::from_toml("[feed]\nsource = \"custom\"\n").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let config = AppConfig::from_toml(
            "[feed]\nsource = \"custom\"\nsymbol = \"BTCUSD\"\nurl = \"wss://example.test/ws\"\n",
        )
        .unwrap();
        let ws = config.feed.ws_config().unwrap();
        assert_eq!(ws.url, "wss://example.test/ws");
        assert!(ws.subscribe.unwrap().contains("\"channel\":\"ticker\""));
    }

    #[test]
    fn test_binance_url_from_symbol() {
        let ws = FeedConfig::default().ws_config().unwrap();
        assert_eq!(ws.url, "wss://stream.binance.com:9443/ws/btcusdt@trade");
        assert!(ws.subscribe.is_none());
    }

    #[test]
    fn test_config_serialization_omits_password() {
        let mut config = AppConfig::default();
        config.reference.chainlink_password = Some("secret".to_string());
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[clock]"));
        assert!(!toml_str.contains("secret"));
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.clock.effective(), (900, 180));
        assert_eq!(config.risk.max_trades_per_round, 2);
        assert_eq!(config.dashboard.port, 8080);
        assert!(config.secondary_source().is_none());
    }
}
