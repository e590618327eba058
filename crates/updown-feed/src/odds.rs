//! Outcome-token odds book.
//!
//! Holds the latest YES/NO prices for the active market, a bounded
//! sample history for the trade-momentum feature, and the parsers for
//! order-book frames and market-discovery responses.

use crate::normalizer::decimal_from;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use updown_core::{OddsSnapshot, Price};

/// Samples retained for trade momentum.
pub const ODDS_HISTORY_LEN: usize = 240;

/// Trade-momentum lookback.
pub const MOMENTUM_LOOKBACK_MS: i64 = 60_000;

const MOMENTUM_GAIN: f64 = 5.0;

// ============================================================================
// OddsBook
// ============================================================================

/// Market identity resolved by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveMarket {
    pub slug: String,
    pub yes_token: String,
    pub no_token: String,
}

/// Odds-derived inputs for one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OddsFeatures {
    pub snapshot: OddsSnapshot,
    /// `(yes - no) / (yes + no)` in [-1, 1].
    pub orderbook_imbalance: Option<f64>,
    /// Relative YES/NO drift over the lookback, in [-1, 1].
    pub trade_momentum: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct OddsSample {
    ts_ms: i64,
    yes: f64,
    no: f64,
}

/// Latest odds for the active market.
#[derive(Debug, Default)]
pub struct OddsBook {
    market: Option<ActiveMarket>,
    yes_price: Option<Price>,
    no_price: Option<Price>,
    updated_at_ms: Option<i64>,
    history: VecDeque<OddsSample>,
}

impl OddsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn market(&self) -> Option<&ActiveMarket> {
        self.market.as_ref()
    }

    /// Switch to `market`. Prices and history reset when the market changes.
    ///
    /// Returns `true` if the market changed.
    pub fn set_market(&mut self, market: ActiveMarket) -> bool {
        if self.market.as_ref() == Some(&market) {
            return false;
        }
        self.market = Some(market);
        self.yes_price = None;
        self.no_price = None;
        self.updated_at_ms = None;
        self.history.clear();
        true
    }

    /// Apply price updates keyed by asset id. Unknown assets are ignored.
    ///
    /// Returns `true` if either side changed.
    pub fn apply_updates(&mut self, updates: &[(String, Decimal)], now_ms: i64) -> bool {
        let Some(market) = self.market.as_ref() else {
            return false;
        };
        let mut touched = false;
        for (asset_id, price) in updates {
            if *asset_id == market.yes_token {
                self.yes_price = Some(Price::new(*price));
                touched = true;
            } else if *asset_id == market.no_token {
                self.no_price = Some(Price::new(*price));
                touched = true;
            }
        }
        if touched {
            self.updated_at_ms = Some(now_ms);
        }
        touched
    }

    pub fn snapshot(&self) -> OddsSnapshot {
        OddsSnapshot {
            market_slug: self.market.as_ref().map(|m| m.slug.clone()),
            yes_price: self.yes_price,
            no_price: self.no_price,
            updated_at_ms: self.updated_at_ms,
        }
    }

    /// Record a sample at `now_ms` and derive the odds features.
    ///
    /// Called once per evaluation cycle, so the momentum baseline is the
    /// oldest cycle sample still inside the lookback.
    pub fn sample(&mut self, now_ms: i64) -> OddsFeatures {
        let snapshot = self.snapshot();
        let Some((yes, no)) = snapshot.two_sided() else {
            return OddsFeatures {
                snapshot,
                ..OddsFeatures::default()
            };
        };
        let (yes, no) = (yes.to_f64(), no.to_f64());

        if self.history.len() == ODDS_HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(OddsSample {
            ts_ms: now_ms,
            yes,
            no,
        });

        let lookback_start = now_ms - MOMENTUM_LOOKBACK_MS;
        let baseline = self
            .history
            .iter()
            .find(|s| s.ts_ms >= lookback_start)
            .or(self.history.front())
            .copied();
        let trade_momentum = baseline.map(|base| {
            (((yes - base.yes) - (no - base.no)) * MOMENTUM_GAIN).clamp(-1.0, 1.0)
        });

        OddsFeatures {
            orderbook_imbalance: snapshot.imbalance(),
            trade_momentum,
            snapshot,
        }
    }
}

// ============================================================================
// MoveDetector
// ============================================================================

/// Thresholds for reporting a significant odds move.
#[derive(Debug, Clone, Copy)]
pub struct MoveThresholds {
    /// Relative change, in percent.
    pub threshold_pct: f64,
    /// Absolute change in token price.
    pub min_abs_delta: f64,
    pub cooldown_ms: i64,
}

impl Default for MoveThresholds {
    fn default() -> Self {
        Self {
            threshold_pct: 3.0,
            min_abs_delta: 0.03,
            cooldown_ms: 5_000,
        }
    }
}

/// A reported odds move, relative to the previously reported prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceMove {
    pub slug: Option<String>,
    pub yes_from: Option<Price>,
    pub yes_to: Option<Price>,
    pub no_from: Option<Price>,
    pub no_to: Option<Price>,
    pub observed_at_ms: i64,
}

/// Reports odds moves beyond a relative or absolute threshold, rate
/// limited by a cooldown.
#[derive(Debug, Default)]
pub struct MoveDetector {
    thresholds: MoveThresholds,
    last_yes: Option<Price>,
    last_no: Option<Price>,
    last_event_ms: Option<i64>,
}

impl MoveDetector {
    pub fn new(thresholds: MoveThresholds) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    /// Check `snapshot` against the last reported prices.
    pub fn observe(&mut self, snapshot: &OddsSnapshot, now_ms: i64) -> Option<PriceMove> {
        if let Some(last) = self.last_event_ms {
            if now_ms - last < self.thresholds.cooldown_ms {
                return None;
            }
        }

        let yes_changed = self.moved(self.last_yes, snapshot.yes_price);
        let no_changed = self.moved(self.last_no, snapshot.no_price);
        if !yes_changed && !no_changed {
            return None;
        }

        let event = PriceMove {
            slug: snapshot.market_slug.clone(),
            yes_from: self.last_yes,
            yes_to: snapshot.yes_price,
            no_from: self.last_no,
            no_to: snapshot.no_price,
            observed_at_ms: now_ms,
        };
        if snapshot.yes_price.is_some() {
            self.last_yes = snapshot.yes_price;
        }
        if snapshot.no_price.is_some() {
            self.last_no = snapshot.no_price;
        }
        self.last_event_ms = Some(now_ms);
        Some(event)
    }

    fn moved(&self, previous: Option<Price>, current: Option<Price>) -> bool {
        let Some(current) = current else {
            return false;
        };
        let Some(previous) = previous else {
            return true;
        };
        let (prev, cur) = (previous.to_f64(), current.to_f64());
        if prev == 0.0 {
            return cur != 0.0;
        }
        let abs_delta = (cur - prev).abs();
        let rel_delta = abs_delta / prev.abs();
        rel_delta >= self.thresholds.threshold_pct / 100.0
            || abs_delta >= self.thresholds.min_abs_delta
    }
}

// ============================================================================
// Parsers
// ============================================================================

/// Extract `(asset_id, price)` pairs from an order-book frame.
///
/// Any nested object carrying a string `asset_id` and a `price` (or `p`)
/// counts as an update.
pub fn extract_price_updates(raw: &str) -> Vec<(String, Decimal)> {
    let Ok(payload) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    let mut updates = Vec::new();
    collect_price_updates(&payload, &mut updates);
    updates
}

fn collect_price_updates(value: &Value, out: &mut Vec<(String, Decimal)>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_price_updates(item, out)),
        Value::Object(map) => {
            if let Some(Value::String(asset_id)) = map.get("asset_id") {
                let price = map
                    .get("price")
                    .filter(|v| !v.is_null())
                    .or_else(|| map.get("p"))
                    .and_then(decimal_from);
                if let Some(price) = price {
                    out.push((asset_id.clone(), price));
                }
            }
            for child in map.values() {
                if child.is_object() || child.is_array() {
                    collect_price_updates(child, out);
                }
            }
        }
        _ => {}
    }
}

/// Collect outcome token ids from a market-discovery response.
///
/// Token ids are numeric strings of at least 8 digits found under keys
/// mentioning `token` or `asset`, including JSON-encoded string arrays.
/// Discovery order is preserved and duplicates dropped.
pub fn collect_token_ids(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_tokens(value, false, &mut out);
    out
}

fn collect_tokens(value: &Value, under_token_key: bool, out: &mut Vec<String>) {
    match value {
        Value::String(s) if under_token_key => {
            let trimmed = s.trim();
            if trimmed.len() >= 8 && trimmed.chars().all(|c| c.is_ascii_digit()) {
                if !out.iter().any(|t| t == trimmed) {
                    out.push(trimmed.to_string());
                }
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                    collect_tokens(&parsed, true, out);
                }
            }
        }
        Value::Array(items) => items
            .iter()
            .for_each(|item| collect_tokens(item, under_token_key, out)),
        Value::Object(map) => {
            for (key, child) in map {
                let key = key.to_ascii_lowercase();
                let is_token_key = key.contains("token") || key.contains("asset");
                collect_tokens(child, is_token_key, out);
            }
        }
        _ => {}
    }
}
