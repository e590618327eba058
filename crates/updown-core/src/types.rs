//! Market data types.
//!
//! Contains the normalized `Tick`, the `FeedSource` tag used for
//! provenance, closed `Candle`s and the outcome-token `OddsSnapshot`.

use crate::{Action, CoreError, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Exchange trade stream.
    Binance,
    /// Independent oracle stream (also used as price-to-beat reference).
    Chainlink,
    /// Any other WebSocket source speaking the generic ticker format.
    Custom,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Chainlink => "chainlink",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "chainlink" => Ok(Self::Chainlink),
            "custom" => Ok(Self::Custom),
            other => Err(CoreError::UnknownSource(other.to_string())),
        }
    }
}

/// A normalized price observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub source: FeedSource,
    pub symbol: String,
    pub price: Price,
    /// Traded quantity when the source reports one, otherwise 1.
    pub size: Decimal,
    /// Source timestamp (Unix ms).
    pub observed_at_ms: i64,
}

impl Tick {
    pub fn new(source: FeedSource, symbol: impl Into<String>, price: Price, observed_at_ms: i64) -> Self {
        Self {
            source,
            symbol: symbol.into(),
            price,
            size: Decimal::ONE,
            observed_at_ms,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: Decimal) -> Self {
        self.size = size;
        self
    }
}

/// OHLCV candle built from ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub window: String,
    /// Bucket start (Unix seconds).
    pub start_ts: i64,
    /// Bucket end (Unix seconds, exclusive).
    pub end_ts: i64,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Decimal,
}

/// Latest outcome-token prices from the order-book feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub market_slug: Option<String>,
    pub yes_price: Option<Price>,
    pub no_price: Option<Price>,
    /// Local receive time of the last update (Unix ms).
    pub updated_at_ms: Option<i64>,
}

impl OddsSnapshot {
    /// Both sides quoted.
    pub fn two_sided(&self) -> Option<(Price, Price)> {
        match (self.yes_price, self.no_price) {
            (Some(yes), Some(no)) => Some((yes, no)),
            _ => None,
        }
    }

    /// `|yes - no|`, the edge strength used for sizing.
    pub fn edge_strength(&self) -> Option<Decimal> {
        self.two_sided().map(|(yes, no)| (yes.inner() - no.inner()).abs())
    }

    /// `(yes - no) / (yes + no)` clamped to [-1, 1].
    pub fn imbalance(&self) -> Option<f64> {
        let (yes, no) = self.two_sided()?;
        let (yes, no) = (yes.to_f64(), no.to_f64());
        let denom = yes + no;
        if denom <= 0.0 {
            return None;
        }
        Some(((yes - no) / denom).clamp(-1.0, 1.0))
    }

    /// Price of the token held by `action`.
    pub fn price_for(&self, action: Action) -> Option<Price> {
        match action {
            Action::BuyYes => self.yes_price,
            Action::BuyNo => self.no_price,
            Action::None => None,
        }
    }

    /// Whether the market favours the direction of `action`.
    ///
    /// `None` when either side is missing.
    pub fn supports(&self, action: Action) -> Option<bool> {
        let (yes, no) = self.two_sided()?;
        Some(match action {
            Action::BuyYes => yes > no,
            Action::BuyNo => no > yes,
            Action::None => false,
        })
    }

    /// Age of the snapshot relative to `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> Option<i64> {
        self.updated_at_ms.map(|ts| now_ms.saturating_sub(ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn odds(yes: Decimal, no: Decimal) -> OddsSnapshot {
        OddsSnapshot {
            market_slug: Some("btc-updown-15m-0".to_string()),
            yes_price: Some(Price::new(yes)),
            no_price: Some(Price::new(no)),
            updated_at_ms: Some(1_000),
        }
    }

    #[test]
    fn test_feed_source_parse() {
        assert_eq!("Binance".parse::<FeedSource>().unwrap(), FeedSource::Binance);
        assert_eq!(" chainlink ".parse::<FeedSource>().unwrap(), FeedSource::Chainlink);
        assert!("kraken".parse::<FeedSource>().is_err());
    }

    #[test]
    fn test_odds_edge_strength_and_imbalance() {
        let snap = odds(dec!(0.6), dec!(0.4));
        assert_eq!(snap.edge_strength(), Some(dec!(0.2)));
        let imbalance = snap.imbalance().unwrap();
        assert!((imbalance - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_odds_supports() {
        let snap = odds(dec!(0.6), dec!(0.4));
        assert_eq!(snap.supports(Action::BuyYes), Some(true));
        assert_eq!(snap.supports(Action::BuyNo), Some(false));
        assert_eq!(OddsSnapshot::default().supports(Action::BuyYes), None);
    }

    #[test]
    fn test_odds_price_for() {
        let snap = odds(dec!(0.6), dec!(0.4));
        assert_eq!(snap.price_for(Action::BuyNo), Some(Price::new(dec!(0.4))));
        assert_eq!(snap.price_for(Action::None), None);
    }
}
