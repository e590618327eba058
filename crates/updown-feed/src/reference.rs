//! Round-open reference price clients.
//!
//! Two REST lookups back the top price-to-beat tiers:
//! - historical oracle candles (`/api/v1/history/rows`)
//! - exchange klines (`/api/v3/klines`)
//!
//! Response parsing is kept in pure functions so it can be tested without
//! a server.

use crate::chainlink::ChainlinkClient;
use crate::error::{FeedError, FeedResult};
use crate::normalizer::{decimal_from, normalize_chainlink_price};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use updown_core::Price;

/// Default exchange REST endpoint.
pub const DEFAULT_KLINE_BASE_URL: &str = "https://api.binance.com";

/// Kline interval matching a round duration, if the exchange offers one.
pub fn kline_interval(round_secs: i64) -> Option<&'static str> {
    match round_secs {
        60 => Some("1m"),
        300 => Some("5m"),
        900 => Some("15m"),
        1800 => Some("30m"),
        3600 => Some("1h"),
        _ => None,
    }
}

/// Open price from a klines response: first row, index 1.
pub fn parse_kline_open(payload: &Value) -> Option<Price> {
    let first = payload.as_array()?.first()?.as_array()?;
    let open = decimal_from(first.get(1)?)?;
    (open > Decimal::ZERO).then_some(Price::new(open))
}

/// Open price from a history-rows response.
///
/// Prefers the candle stamped exactly at `open_ts`, else the first
/// well-formed candle. Oracle fixed-point scaling is applied.
pub fn parse_history_open(payload: &Value, open_ts: i64) -> Option<Price> {
    let candles = payload.get("candles")?.as_array()?;
    let well_formed = |c: &&Value| {
        c.as_array()
            .is_some_and(|row| row.len() >= 2 && row[0].is_number())
    };
    let stamped_at_open = |c: &&Value| {
        c.as_array()
            .and_then(|row| decimal_from(&row[0]))
            .and_then(|ts| ts.trunc().to_i64())
            == Some(open_ts)
    };

    let selected = candles
        .iter()
        .filter(well_formed)
        .find(stamped_at_open)
        .or_else(|| candles.iter().find(well_formed))?;

    let open = normalize_chainlink_price(decimal_from(selected.as_array()?.get(1)?)?);
    (open > Decimal::ZERO).then_some(Price::new(open))
}

/// Exchange kline client.
#[derive(Debug, Clone)]
pub struct KlineClient {
    http: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl KlineClient {
    pub fn new(base_url: &str, symbol: &str, timeout: Duration) -> FeedResult<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.trim().to_uppercase(),
        })
    }

    /// Open price of the kline starting at `open_ts` (Unix seconds).
    ///
    /// `Ok(None)` when the round duration has no matching interval or the
    /// exchange returned no usable row.
    pub async fn open_price(&self, open_ts: i64, round_secs: i64) -> FeedResult<Option<Price>> {
        let Some(interval) = kline_interval(round_secs) else {
            debug!(round_secs, "No kline interval for round duration");
            return Ok(None);
        };
        let start_ms = (open_ts * 1000).to_string();
        let response = self
            .http
            .get(format!("{}/api/v3/klines", self.base_url))
            .query(&[
                ("symbol", self.symbol.as_str()),
                ("interval", interval),
                ("startTime", start_ms.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let payload: Value = response.json().await?;
        Ok(parse_kline_open(&payload))
    }
}

/// Historical oracle candle client.
#[derive(Debug, Clone)]
pub struct CandleHistoryClient {
    client: ChainlinkClient,
    symbol: String,
    timeout: Duration,
}

impl CandleHistoryClient {
    pub fn new(client: ChainlinkClient, symbol: &str, timeout: Duration) -> Self {
        Self {
            client,
            symbol: symbol.trim().to_uppercase(),
            timeout,
        }
    }

    /// Open price of the one-minute candle at `open_ts` (Unix seconds).
    pub async fn open_price(&self, open_ts: i64) -> FeedResult<Option<Price>> {
        let token = self.client.authorize().await?;
        let from = open_ts.to_string();
        let to = (open_ts + 60).to_string();
        let response = self
            .client
            .http()
            .get(format!("{}/api/v1/history/rows", self.client.base_url()))
            .query(&[
                ("symbol", self.symbol.as_str()),
                ("resolution", "1m"),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ])
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FeedError::InvalidData(format!(
                "history rows HTTP {}",
                response.status()
            )));
        }
        let payload: Value = response.json().await?;
        Ok(parse_history_open(&payload, open_ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_kline_interval_map() {
        assert_eq!(kline_interval(900), Some("15m"));
        assert_eq!(kline_interval(3600), Some("1h"));
        assert_eq!(kline_interval(120), None);
    }

    #[test]
    fn test_parse_kline_open() {
        let payload = json!([[1700000100000i64, "97000.50", "97100.0", "96900.0", "97050.0"]]);
        assert_eq!(parse_kline_open(&payload), Some(Price::new(dec!(97000.50))));
        assert_eq!(parse_kline_open(&json!([])), None);
        assert_eq!(parse_kline_open(&json!([[1]])), None);
        assert_eq!(parse_kline_open(&json!({"code": -1121})), None);
    }

    #[test]
    fn test_parse_history_prefers_exact_open() {
        let payload = json!({
            "candles": [
                [1700000040, 96000.0],
                [1700000100, 97000.0],
            ]
        });
        assert_eq!(
            parse_history_open(&payload, 1_700_000_100),
            Some(Price::new(dec!(97000)))
        );
        // No exact match: first well-formed candle.
        assert_eq!(
            parse_history_open(&payload, 1_700_000_160),
            Some(Price::new(dec!(96000)))
        );
    }

    #[test]
    fn test_parse_history_normalizes_fixed_point() {
        let payload = json!({"candles": [["bad"], [1700000100, "97000000000000000000000"]]});
        assert_eq!(
            parse_history_open(&payload, 1_700_000_100),
            Some(Price::new(dec!(97000)))
        );
        assert_eq!(parse_history_open(&json!({"candles": []}), 0), None);
    }
}
