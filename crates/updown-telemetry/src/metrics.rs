//! Prometheus metrics for the updown engine.
//!
//! Covers:
//! - Feed ingestion, staleness and reconnects
//! - Round transitions
//! - Decisions, risk rejections and economics blocks
//! - Positions, settlements and realized PnL
//! - Kill switch state and evaluation-cycle latency
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a fatal startup error; it never happens at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, register_int_gauge, Counter, CounterVec, Encoder, Gauge, GaugeVec,
    Histogram, IntGauge, TextEncoder,
};

/// Normalized ticks accepted per source.
pub static TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_ticks_total",
        "Normalized ticks accepted",
        &["source"]
    )
    .unwrap()
});

/// Raw payloads rejected by the normalizer per source.
pub static TICKS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_ticks_rejected_total",
        "Raw feed payloads rejected as malformed or off-symbol",
        &["source"]
    )
    .unwrap()
});

/// Feed connection state (1 = connected).
pub static FEED_CONNECTED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "updown_feed_connected",
        "Feed connection state (1=connected)",
        &["source"]
    )
    .unwrap()
});

/// Feed reconnection attempts.
pub static FEED_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_feed_reconnect_total",
        "Feed reconnection attempts",
        &["source"]
    )
    .unwrap()
});

/// Feed staleness (1 = stale).
pub static FEED_STALE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "updown_feed_stale",
        "Feed staleness as seen by the evaluation loop (1=stale)",
        &["source"]
    )
    .unwrap()
});

/// Currently active round id (0 when none).
pub static ACTIVE_ROUND_ID: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("updown_active_round_id", "Currently active round id").unwrap()
});

/// Round lifecycle transitions.
pub static ROUND_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_round_transitions_total",
        "Round lifecycle transitions",
        &["kind"]
    )
    .unwrap()
});

/// Router decisions by action.
pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_decisions_total",
        "Decision router outputs",
        &["action", "strategy"]
    )
    .unwrap()
});

/// Risk guard rejections by reason.
pub static RISK_REJECTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_risk_rejections_total",
        "Risk guard rejections",
        &["reason"]
    )
    .unwrap()
});

/// Execution economics blocks by reason.
pub static ECONOMICS_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_economics_blocked_total",
        "Intents blocked by the execution economics gate",
        &["reason"]
    )
    .unwrap()
});

/// Paper positions opened.
pub static POSITIONS_OPENED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_positions_opened_total",
        "Paper positions opened",
        &["action"]
    )
    .unwrap()
});

/// Settlements by outcome.
pub static SETTLEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_settlements_total",
        "Settlements by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Price-to-beat resolutions by tier.
pub static PRICE_TO_BEAT_TIER_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_price_to_beat_tier_total",
        "Price-to-beat resolutions by tier",
        &["tier"]
    )
    .unwrap()
});

/// Cumulative realized net PnL in USD.
pub static REALIZED_PNL_USD: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "updown_realized_pnl_usd",
        "Cumulative realized net PnL in USD"
    )
    .unwrap()
});

/// Kill switch state (1 = engaged).
pub static KILL_SWITCH_ENGAGED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("updown_kill_switch_engaged", "Kill switch state (1=engaged)").unwrap()
});

/// Evaluation-cycle latency in milliseconds.
pub static EVAL_CYCLE_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "updown_eval_cycle_ms",
        "Evaluation cycle latency in milliseconds",
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]
    )
    .unwrap()
});

/// Evaluation cycles that ended in an internal error.
pub static EVAL_CYCLE_ERRORS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "updown_eval_cycle_errors_total",
        "Evaluation cycles that failed and were treated as no-decision"
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    pub fn tick_accepted(source: &str) {
        TICKS_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn tick_rejected(source: &str) {
        TICKS_REJECTED_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn feed_connected(source: &str) {
        FEED_CONNECTED.with_label_values(&[source]).set(1.0);
    }

    pub fn feed_disconnected(source: &str) {
        FEED_CONNECTED.with_label_values(&[source]).set(0.0);
    }

    pub fn feed_reconnect(source: &str) {
        FEED_RECONNECT_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn feed_stale(source: &str, stale: bool) {
        FEED_STALE
            .with_label_values(&[source])
            .set(if stale { 1.0 } else { 0.0 });
    }

    pub fn round_activated(round_id: u64) {
        ACTIVE_ROUND_ID.set(round_id as i64);
        ROUND_TRANSITIONS_TOTAL
            .with_label_values(&["activated"])
            .inc();
    }

    pub fn round_closed() {
        ACTIVE_ROUND_ID.set(0);
        ROUND_TRANSITIONS_TOTAL.with_label_values(&["closed"]).inc();
    }

    pub fn decision(action: &str, strategy: &str) {
        DECISIONS_TOTAL
            .with_label_values(&[action, strategy])
            .inc();
    }

    pub fn risk_rejected(reason: &str) {
        RISK_REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn economics_blocked(reason: &str) {
        ECONOMICS_BLOCKED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn position_opened(action: &str) {
        POSITIONS_OPENED_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn settled(outcome: &str, net_pnl_usd: f64) {
        SETTLEMENTS_TOTAL.with_label_values(&[outcome]).inc();
        REALIZED_PNL_USD.add(net_pnl_usd);
    }

    pub fn price_to_beat_resolved(tier: &str) {
        PRICE_TO_BEAT_TIER_TOTAL.with_label_values(&[tier]).inc();
    }

    pub fn kill_switch(engaged: bool) {
        KILL_SWITCH_ENGAGED.set(if engaged { 1.0 } else { 0.0 });
    }

    pub fn eval_cycle(latency_ms: f64) {
        EVAL_CYCLE_MS.observe(latency_ms);
    }

    pub fn eval_cycle_error() {
        EVAL_CYCLE_ERRORS_TOTAL.inc();
    }

    /// Render the default registry in Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
