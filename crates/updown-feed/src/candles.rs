//! Time-bucketed OHLCV candles built from live ticks.

use crate::error::{FeedError, FeedResult};
use rust_decimal::Decimal;
use updown_core::{Candle, Tick};

/// Parse a window like `15s`, `1m`, `4h`, `1d` into seconds.
pub fn parse_window_secs(window: &str) -> FeedResult<i64> {
    let value = window.trim().to_ascii_lowercase();
    let Some(unit) = value.chars().last() else {
        return Err(FeedError::InvalidData("window must not be empty".to_string()));
    };
    let factor = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        other => {
            return Err(FeedError::InvalidData(format!(
                "unsupported window unit: {other}"
            )))
        }
    };
    let number: i64 = value[..value.len() - 1]
        .parse()
        .map_err(|_| FeedError::InvalidData(format!("invalid window: {window}")))?;
    if number <= 0 {
        return Err(FeedError::InvalidData("window must be > 0".to_string()));
    }
    Ok(number * factor)
}

/// Single-symbol candle builder.
///
/// Holds the in-progress candle and hands back the completed one as soon
/// as a tick lands in a newer bucket. Ticks for an older bucket are
/// ignored.
#[derive(Debug)]
pub struct CandleBuilder {
    symbol: String,
    window: String,
    window_secs: i64,
    current: Option<Candle>,
}

impl CandleBuilder {
    pub fn new(symbol: impl Into<String>, window: &str) -> FeedResult<Self> {
        Ok(Self {
            symbol: symbol.into(),
            window: window.trim().to_string(),
            window_secs: parse_window_secs(window)?,
            current: None,
        })
    }

    #[inline]
    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// In-progress candle.
    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    /// Fold a tick in. Returns the candle it closed, if any.
    pub fn add_tick(&mut self, tick: &Tick) -> Option<Candle> {
        let ts_secs = tick.observed_at_ms.div_euclid(1000);
        let bucket_start = ts_secs.div_euclid(self.window_secs) * self.window_secs;

        match self.current.as_mut() {
            Some(candle) if candle.start_ts == bucket_start => {
                candle.high = candle.high.max(tick.price);
                candle.low = candle.low.min(tick.price);
                candle.close = tick.price;
                candle.volume += tick.size;
                None
            }
            Some(candle) if bucket_start < candle.start_ts => None,
            _ => {
                let opened = self.open_candle(bucket_start, tick);
                self.current.replace(opened)
            }
        }
    }

    fn open_candle(&self, bucket_start: i64, tick: &Tick) -> Candle {
        Candle {
            symbol: self.symbol.clone(),
            window: self.window.clone(),
            start_ts: bucket_start,
            end_ts: bucket_start + self.window_secs,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.size.max(Decimal::ZERO),
        }
    }
}
