//! Raw payload normalization.
//!
//! Turns source-specific JSON into `Tick`s. Malformed payloads, heartbeat
//! frames and ticks for other symbols are dropped (counted, never raised).
//!
//! Supported formats:
//! 1. Binance trade stream: `{"s": "BTCUSDT", "p": "97000.1", "T": 1700000000000, "q": "0.01"}`
//! 2. Chainlink streaming: `{"f": "t", "i": "BTCUSD", "p": 9.7e22, "t": 1700000000}`
//! 3. Custom ticker: `{"symbol": "BTC", "price": 97000.1, "ts": 1700000000.5}`

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;
use updown_core::{FeedSource, Price, Tick};
use updown_telemetry::Metrics;

/// Chainlink prices at or above this magnitude are 18-decimal fixed point.
const CHAINLINK_FIXED_POINT_THRESHOLD: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// 1e18 scaling factor for Chainlink fixed-point prices.
const CHAINLINK_SCALE: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

/// Ingestion counters.
#[derive(Debug, Default)]
pub struct NormalizerStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl NormalizerStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Binance `@trade` payload.
#[derive(Debug, Deserialize)]
struct BinanceTrade {
    #[serde(rename = "s", default)]
    symbol: Option<String>,
    #[serde(rename = "p", default)]
    price: Option<Value>,
    #[serde(rename = "T", default)]
    trade_time: Option<Value>,
    #[serde(rename = "E", default)]
    event_time: Option<Value>,
    #[serde(rename = "q", default)]
    quantity: Option<Value>,
}

/// Chainlink streaming line.
#[derive(Debug, Deserialize)]
struct ChainlinkLine {
    #[serde(default)]
    heartbeat: Option<Value>,
    #[serde(rename = "f", default)]
    kind: Option<String>,
    #[serde(rename = "i", default)]
    symbol: Option<String>,
    #[serde(rename = "p", default)]
    price: Option<Value>,
    #[serde(rename = "t", default)]
    ts: Option<Value>,
    #[serde(rename = "s", default)]
    size: Option<Value>,
}

/// Generic ticker payload.
#[derive(Debug, Deserialize)]
struct CustomTicker {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    ts: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    size: Option<Value>,
}

/// Per-source payload normalizer.
#[derive(Debug)]
pub struct FeedNormalizer {
    source: FeedSource,
    symbol: String,
    stats: NormalizerStats,
}

impl FeedNormalizer {
    /// Create a normalizer accepting ticks for `symbol` only.
    pub fn new(source: FeedSource, symbol: &str) -> Self {
        Self {
            source,
            symbol: symbol.trim().to_uppercase(),
            stats: NormalizerStats::default(),
        }
    }

    #[inline]
    pub fn source(&self) -> FeedSource {
        self.source
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn stats(&self) -> &NormalizerStats {
        &self.stats
    }

    /// Normalize one raw payload.
    ///
    /// Returns `None` for anything that is not a well-formed tick for the
    /// configured symbol.
    pub fn ingest(&self, raw: &str) -> Option<Tick> {
        match self.parse(raw) {
            Some(tick) if tick.symbol.eq_ignore_ascii_case(&self.symbol) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Metrics::tick_accepted(self.source.as_str());
                Some(tick)
            }
            other => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Metrics::tick_rejected(self.source.as_str());
                trace!(
                    source = %self.source,
                    off_symbol = other.is_some(),
                    len = raw.len(),
                    "Dropped feed payload"
                );
                None
            }
        }
    }

    fn parse(&self, raw: &str) -> Option<Tick> {
        let value: Value = serde_json::from_str(raw).ok()?;
        if !value.is_object() {
            return None;
        }
        match self.source {
            FeedSource::Binance => parse_binance(value),
            FeedSource::Chainlink => parse_chainlink(value),
            FeedSource::Custom => parse_custom(value),
        }
    }
}

fn parse_binance(value: Value) -> Option<Tick> {
    let msg: BinanceTrade = serde_json::from_value(value).ok()?;
    let symbol = msg.symbol?.trim().to_uppercase();
    if symbol.is_empty() {
        return None;
    }
    let price = positive_price(msg.price.as_ref()?)?;
    let ts_ms = msg
        .trade_time
        .as_ref()
        .or(msg.event_time.as_ref())
        .and_then(decimal_from)?
        .to_i64()?;
    let size = msg
        .quantity
        .as_ref()
        .and_then(decimal_from)
        .unwrap_or(Decimal::ZERO);

    Some(Tick::new(FeedSource::Binance, symbol, price, ts_ms).with_size(size))
}

fn parse_chainlink(value: Value) -> Option<Tick> {
    let msg: ChainlinkLine = serde_json::from_value(value).ok()?;
    if msg.heartbeat.is_some() {
        return None;
    }
    if !msg.kind?.trim().eq_ignore_ascii_case("t") {
        return None;
    }
    let symbol = msg.symbol?.trim().to_uppercase();
    if symbol.is_empty() {
        return None;
    }
    let price = normalize_chainlink_price(decimal_from(msg.price.as_ref()?)?);
    if price <= Decimal::ZERO {
        return None;
    }
    let ts_ms = seconds_to_ms(decimal_from(msg.ts.as_ref()?)?)?;
    let size = msg
        .size
        .as_ref()
        .and_then(decimal_from)
        .unwrap_or(Decimal::ONE);

    Some(Tick::new(FeedSource::Chainlink, symbol, Price::new(price), ts_ms).with_size(size))
}

fn parse_custom(value: Value) -> Option<Tick> {
    let msg: CustomTicker = serde_json::from_value(value).ok()?;
    let symbol = msg.symbol?.trim().to_string();
    if symbol.is_empty() {
        return None;
    }
    let price = positive_price(msg.price.as_ref()?)?;
    let ts = msg.ts.as_ref().or(msg.timestamp.as_ref())?;
    let ts_ms = seconds_to_ms(decimal_from(ts)?)?;
    let size = msg
        .size
        .as_ref()
        .and_then(decimal_from)
        .unwrap_or(Decimal::ONE);

    Some(Tick::new(FeedSource::Custom, symbol, price, ts_ms).with_size(size))
}

/// Scale 18-decimal fixed-point oracle prices down to units.
pub fn normalize_chainlink_price(value: Decimal) -> Decimal {
    if value.abs() >= CHAINLINK_FIXED_POINT_THRESHOLD {
        value / CHAINLINK_SCALE
    } else {
        value
    }
}

/// Read a JSON number or numeric string as a decimal.
pub(crate) fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Decimal::from(u))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        _ => None,
    }
}

fn positive_price(value: &Value) -> Option<Price> {
    let price = decimal_from(value)?;
    (price > Decimal::ZERO).then_some(Price::new(price))
}

fn seconds_to_ms(seconds: Decimal) -> Option<i64> {
    (seconds * Decimal::ONE_THOUSAND).trunc().to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_chainlink_constants() {
        assert_eq!(CHAINLINK_FIXED_POINT_THRESHOLD, dec!(1_000_000_000_000));
        assert_eq!(CHAINLINK_SCALE, dec!(1_000_000_000_000_000_000));
    }

    #[test]
    fn test_binance_trade() {
        let n = FeedNormalizer::new(FeedSource::Binance, "btcusdt");
        let raw = r#"{"e":"trade","E":1700000000999,"s":"BTCUSDT","t":1,"p":"97000.50","q":"0.015","T":1700000000123}"#;
        let tick = n.ingest(raw).unwrap();
        assert_eq!(tick.source, FeedSource::Binance);
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, Price::new(dec!(97000.50)));
        assert_eq!(tick.size, dec!(0.015));
        assert_eq!(tick.observed_at_ms, 1_700_000_000_123);
        assert_eq!(n.stats().accepted(), 1);
    }

    #[test]
    fn test_binance_falls_back_to_event_time() {
        let n = FeedNormalizer::new(FeedSource::Binance, "BTCUSDT");
        let raw = r#"{"E":1700000000999,"s":"BTCUSDT","p":"97000.5"}"#;
        assert_eq!(n.ingest(raw).unwrap().observed_at_ms, 1_700_000_000_999);
    }

    #[test]
    fn test_binance_off_symbol_dropped() {
        let n = FeedNormalizer::new(FeedSource::Binance, "BTCUSDT");
        let raw = r#"{"s":"ETHUSDT","p":"3000","T":1700000000000}"#;
        assert!(n.ingest(raw).is_none());
        assert_eq!(n.stats().rejected(), 1);
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        let n = FeedNormalizer::new(FeedSource::Binance, "BTCUSDT");
        for raw in [
            "not json",
            "[1,2,3]",
            r#"{"s":"BTCUSDT","T":1}"#,
            r#"{"s":"BTCUSDT","p":"abc","T":1}"#,
            r#"{"s":"BTCUSDT","p":"-5","T":1}"#,
            r#"{"s":"BTCUSDT","p":"97000"}"#,
        ] {
            assert!(n.ingest(raw).is_none(), "accepted {raw}");
        }
        assert_eq!(n.stats().rejected(), 6);
    }

    #[test]
    fn test_chainlink_fixed_point_price() {
        let n = FeedNormalizer::new(FeedSource::Chainlink, "BTCUSD");
        let raw = r#"{"f":"t","i":"btcusd","p":"97000500000000000000000","t":1700000000}"#;
        let tick = n.ingest(raw).unwrap();
        assert_eq!(tick.price, Price::new(dec!(97000.5)));
        assert_eq!(tick.observed_at_ms, 1_700_000_000_000);
        assert_eq!(tick.size, Decimal::ONE);
    }

    #[test]
    fn test_chainlink_plain_price_and_heartbeat() {
        let n = FeedNormalizer::new(FeedSource::Chainlink, "BTCUSD");
        let plain = r#"{"f":"t","i":"BTCUSD","p":97000.25,"t":1700000000.5}"#;
        let tick = n.ingest(plain).unwrap();
        assert_eq!(tick.price, Price::new(dec!(97000.25)));
        assert_eq!(tick.observed_at_ms, 1_700_000_000_500);

        assert!(n.ingest(r#"{"heartbeat":1700000000}"#).is_none());
        assert!(n
            .ingest(r#"{"f":"q","i":"BTCUSD","p":1,"t":1700000000}"#)
            .is_none());
    }

    #[test]
    fn test_custom_ticker() {
        let n = FeedNormalizer::new(FeedSource::Custom, "BTC");
        let raw = r#"{"symbol":"BTC","price":97000.1,"timestamp":1700000000}"#;
        let tick = n.ingest(raw).unwrap();
        assert_eq!(tick.source, FeedSource::Custom);
        assert_eq!(tick.observed_at_ms, 1_700_000_000_000);

        assert!(n.ingest(r#"{"symbol":"","price":1,"ts":1}"#).is_none());
    }

    #[test]
    fn test_normalize_chainlink_price_small_values_untouched() {
        assert_eq!(normalize_chainlink_price(dec!(97000.5)), dec!(97000.5));
        assert_eq!(
            normalize_chainlink_price(dec!(2_000_000_000_000_000_000)),
            dec!(2)
        );
    }
}
