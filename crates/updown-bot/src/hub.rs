//! Shared feed state.
//!
//! Feed tasks push ticks and odds frames in through `TickSink` /
//! `OddsSink`; the evaluation loop reads consistent snapshots out. Every
//! piece of state sits behind its own short-lived lock, so a slow feed
//! never holds up evaluation.

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::AppResult;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use updown_core::{Candle, FeedSource, Price, Round, Tick};
use updown_feed::{
    extract_price_updates, ActiveMarket, CandleBuilder, FeedFreshness, OddsBook, OddsFeatures,
    OddsSink, RoundAnchors, TickSink, DEFAULT_RETAINED_ROUNDS,
};
use updown_settlement::RoundPriceSource;
use updown_signal::{Features, SignalState};

pub struct FeedHub {
    clock: Arc<dyn Clock>,
    primary: FeedSource,
    settlement_source: FeedSource,
    secondary: Option<FeedSource>,
    signal: Mutex<SignalState>,
    anchors: Mutex<RoundAnchors>,
    candles: Mutex<CandleBuilder>,
    last_candle: Mutex<Option<Candle>>,
    freshness: FeedFreshness,
    odds: Mutex<OddsBook>,
}

impl FeedHub {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let (round_secs, _) = config.clock.effective();
        Ok(Self {
            clock,
            primary: config.feed.source,
            settlement_source: config.settlement_source(),
            secondary: config.secondary_source(),
            signal: Mutex::new(SignalState::default()),
            anchors: Mutex::new(RoundAnchors::new(round_secs, DEFAULT_RETAINED_ROUNDS)),
            candles: Mutex::new(CandleBuilder::new(
                config.feed.symbol.clone(),
                &config.feed.candle_window,
            )?),
            last_candle: Mutex::new(None),
            freshness: FeedFreshness::new(),
            odds: Mutex::new(OddsBook::new()),
        })
    }

    pub fn primary_source(&self) -> FeedSource {
        self.primary
    }

    pub fn settlement_source(&self) -> FeedSource {
        self.settlement_source
    }

    pub fn secondary_source(&self) -> Option<FeedSource> {
        self.secondary
    }

    // ------------------------------------------------------------------
    // Evaluation-side reads
    // ------------------------------------------------------------------

    /// Start a fresh signal window for a newly activated round.
    pub fn reset_signal(&self, round_id: u64) {
        self.signal.lock().reset(round_id);
    }

    pub fn features(&self) -> Features {
        self.signal.lock().features()
    }

    /// Latest primary tick, whether or not a round is active.
    pub fn latest_tick(&self) -> Option<Tick> {
        self.anchors.lock().latest(self.primary).cloned()
    }

    pub fn last_candle(&self) -> Option<Candle> {
        self.last_candle.lock().clone()
    }

    /// Record an odds sample and derive the odds features.
    pub fn sample_odds(&self, now_ms: i64) -> OddsFeatures {
        self.odds.lock().sample(now_ms)
    }

    pub fn is_stale(&self, source: FeedSource, max_age: Duration, now_ms: i64) -> bool {
        self.freshness.is_stale(source, max_age, now_ms)
    }

    /// Primary vs secondary latest price divergence, in bps.
    pub fn divergence_bps(&self) -> Option<f64> {
        let secondary = self.secondary?;
        let anchors = self.anchors.lock();
        let primary = anchors.latest(self.primary)?.price;
        let other = anchors.latest(secondary)?.price;
        other.bps_from(primary).and_then(|bps| bps.abs().to_f64())
    }

    fn record_tick(&self, tick: Tick) {
        self.freshness.record(tick.source, self.clock.now_ms());
        self.anchors.lock().record(&tick);

        if tick.source != self.primary {
            return;
        }
        if let Some(candle) = self.candles.lock().add_tick(&tick) {
            debug!(
                symbol = %candle.symbol,
                window = %candle.window,
                start_ts = candle.start_ts,
                open = %candle.open,
                close = %candle.close,
                "Candle closed"
            );
            *self.last_candle.lock() = Some(candle);
        }
        self.signal.lock().push(tick);
    }
}

impl TickSink for FeedHub {
    fn on_tick(&self, tick: Tick) {
        self.record_tick(tick);
    }
}

impl OddsSink for FeedHub {
    fn on_market(&self, market: ActiveMarket) {
        let slug = market.slug.clone();
        if self.odds.lock().set_market(market) {
            info!(%slug, "Odds market switched");
        }
    }

    fn on_frame(&self, raw: &str) {
        let updates = extract_price_updates(raw);
        if updates.is_empty() {
            return;
        }
        let now_ms = self.clock.now_ms();
        self.odds.lock().apply_updates(&updates, now_ms);
    }
}

impl RoundPriceSource for FeedHub {
    fn close_price(&self, round: &Round) -> Option<Price> {
        self.anchors.lock().close_price(self.settlement_source, round)
    }

    fn last_tick_before_open(&self, round: &Round) -> Option<Price> {
        self.anchors
            .lock()
            .last_tick_before_open(self.settlement_source, round)
            .map(|t| t.price)
    }

    fn opening_tick(&self, round: &Round) -> Option<Price> {
        self.anchors
            .lock()
            .opening_tick(self.settlement_source, round)
            .map(|t| t.price)
    }
}
