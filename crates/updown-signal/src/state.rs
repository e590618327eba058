//! Rolling per-round signal state.

use serde::Serialize;
use std::collections::VecDeque;
use updown_core::{Price, Tick};

/// Prices retained per round.
pub const DEFAULT_WINDOW: usize = 240;

/// Lookback for the short return (`p[-1] / p[-8] - 1`).
pub const RETURN_LOOKBACK: usize = 8;

/// Prices used for the z-score.
pub const ZSCORE_WINDOW: usize = 30;

/// Price-derived features for one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Features {
    pub last_price: Option<f64>,
    pub return_short: Option<f64>,
    pub zscore: Option<f64>,
    pub samples: usize,
}

/// Bounded tick window scoped to the active round.
#[derive(Debug)]
pub struct SignalState {
    capacity: usize,
    round_id: Option<u64>,
    prices: VecDeque<f64>,
    last_tick: Option<Tick>,
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SignalState {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(RETURN_LOOKBACK);
        Self {
            capacity,
            round_id: None,
            prices: VecDeque::with_capacity(capacity),
            last_tick: None,
        }
    }

    /// Clear the window for a newly activated round.
    pub fn reset(&mut self, round_id: u64) {
        self.round_id = Some(round_id);
        self.prices.clear();
        self.last_tick = None;
    }

    #[inline]
    pub fn round_id(&self) -> Option<u64> {
        self.round_id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn last_tick(&self) -> Option<&Tick> {
        self.last_tick.as_ref()
    }

    pub fn last_price(&self) -> Option<Price> {
        self.last_tick.as_ref().map(|t| t.price)
    }

    /// Append a tick, evicting the oldest price when full.
    pub fn push(&mut self, tick: Tick) {
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(tick.price.to_f64());
        self.last_tick = Some(tick);
    }

    /// Compute the current features.
    pub fn features(&self) -> Features {
        Features {
            last_price: self.prices.back().copied(),
            return_short: self.return_short(),
            zscore: self.zscore(),
            samples: self.prices.len(),
        }
    }

    fn return_short(&self) -> Option<f64> {
        let n = self.prices.len();
        if n < RETURN_LOOKBACK {
            return None;
        }
        let now = self.prices[n - 1];
        let then = self.prices[n - RETURN_LOOKBACK];
        (then != 0.0).then(|| now / then - 1.0)
    }

    fn zscore(&self) -> Option<f64> {
        let n = self.prices.len();
        if n < ZSCORE_WINDOW {
            return None;
        }
        let window = self.prices.range(n - ZSCORE_WINDOW..);
        let mean = window.clone().sum::<f64>() / ZSCORE_WINDOW as f64;
        let variance = window.map(|p| (p - mean).powi(2)).sum::<f64>() / ZSCORE_WINDOW as f64;
        let sigma = variance.sqrt();
        if sigma <= 0.0 || !sigma.is_finite() {
            return None;
        }
        Some((self.prices[n - 1] - mean) / sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use updown_core::FeedSource;

    fn push_all(state: &mut SignalState, prices: &[f64]) {
        for (i, p) in prices.iter().enumerate() {
            let price = Price::new(Decimal::from_f64(*p).unwrap());
            state.push(Tick::new(FeedSource::Binance, "BTCUSDT", price, i as i64 * 1000));
        }
    }

    #[test]
    fn test_return_short_needs_eight_prices() {
        let mut state = SignalState::default();
        push_all(&mut state, &[100.0; 7]);
        assert_eq!(state.features().return_short, None);

        push_all(&mut state, &[101.0]);
        // p[-1] = 101, p[-8] = 100
        let r = state.features().return_short.unwrap();
        assert!((r - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_requires_variance() {
        let mut state = SignalState::default();
        push_all(&mut state, &[100.0; 30]);
        assert_eq!(state.features().zscore, None);

        let mut state = SignalState::default();
        let mut prices = vec![100.0; 29];
        prices.push(103.0);
        push_all(&mut state, &prices);
        let z = state.features().zscore.unwrap();
        // Single outlier among 30: z = sqrt(29).
        assert!((z - 29f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_bounded_and_reset() {
        let mut state = SignalState::new(10);
        push_all(&mut state, &[1.0; 25]);
        assert_eq!(state.len(), 10);

        state.reset(42);
        assert!(state.is_empty());
        assert_eq!(state.round_id(), Some(42));
        assert!(state.last_tick().is_none());
    }
}
