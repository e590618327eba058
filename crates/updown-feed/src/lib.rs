//! Market data feeds for the updown engine.
//!
//! Provides:
//! - Payload normalization into `Tick`s (exchange, oracle, generic ticker)
//! - Per-source freshness, per-round anchors and candle building
//! - The outcome-token odds book with market discovery
//! - Reconnecting WebSocket and HTTP line-stream connections
//! - Round-open reference price clients

pub mod anchors;
pub mod backoff;
pub mod candles;
pub mod chainlink;
pub mod connection;
pub mod error;
pub mod freshness;
pub mod normalizer;
pub mod odds;
pub mod odds_stream;
pub mod reference;
pub mod sink;

pub use anchors::{RoundAnchor, RoundAnchors, DEFAULT_RETAINED_ROUNDS};
pub use backoff::Backoff;
pub use candles::{parse_window_secs, CandleBuilder};
pub use chainlink::{ChainlinkClient, ChainlinkCredentials, ChainlinkStream};
pub use connection::{ConnectionState, SessionEnd, WsConfig, WsFeedConnection};
pub use error::{FeedError, FeedResult};
pub use freshness::FeedFreshness;
pub use normalizer::{normalize_chainlink_price, FeedNormalizer, NormalizerStats};
pub use odds::{
    extract_price_updates, ActiveMarket, MoveDetector, MoveThresholds, OddsBook, OddsFeatures,
    PriceMove,
};
pub use odds_stream::{MarketDiscovery, OddsStream, DEFAULT_GAMMA_BASE_URL};
pub use reference::{kline_interval, CandleHistoryClient, KlineClient, DEFAULT_KLINE_BASE_URL};
pub use sink::{OddsSink, TickSink};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any feed connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
