//! Evaluation cycle.
//!
//! One call to [`Engine::cycle`] runs a full pass of the round lifecycle
//! at a given instant:
//! 1. round transitions (activation resets the signal window and starts
//!    reference fetches, closure hands positions to settlement)
//! 2. settlement of closed rounds whose inputs are ready
//! 3. feed staleness and kill-switch state changes
//! 4. decision, risk gate and paper execution for the active round
//! 5. odds move detection
//! 6. dashboard publication
//!
//! The cycle is synchronous and driven by an explicit timestamp, so the
//! whole lifecycle can be replayed with a fixed clock.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::hub::FeedHub;
use crate::reference::{HttpReferenceFetcher, ReferenceFetcher};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use updown_core::{
    Decision, FeedSource, OddsAlignment, OddsSnapshot, Position, PositionId, Round, RoundClock,
    RoundTransition, Settlement, Usd,
};
use updown_dashboard::{DashboardState, EventEntry, EventKind};
use updown_executor::{Blocked, ExecutionSimulator, MarketView};
use updown_feed::{MoveDetector, MoveThresholds, OddsFeatures};
use updown_persistence::{
    find_orphans, read_records, OpportunityRecord, PaperLogWriter, PaperRecord, PriceMoveRecord,
};
use updown_risk::{RejectReason, RiskGuard};
use updown_settlement::SettlementEngine;
use updown_signal::{DecisionRouter, EvalContext};
use updown_telemetry::Metrics;

/// What one cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub transitions: Vec<RoundTransition>,
    /// Routed decision; `None` outside the activation window.
    pub decision: Option<Decision>,
    pub rejection: Option<RejectReason>,
    pub blocked: Option<Blocked>,
    pub opened: Option<Position>,
    pub settled: Vec<Settlement>,
}

pub struct Engine {
    hub: Arc<FeedHub>,
    dashboard: DashboardState,
    round_clock: RoundClock,
    router: DecisionRouter,
    risk: RiskGuard,
    simulator: ExecutionSimulator,
    settlement: Arc<SettlementEngine>,
    fetcher: Arc<dyn ReferenceFetcher>,
    paper_log: Option<PaperLogWriter>,
    move_detector: MoveDetector,
    stale_after: Duration,
    watched_sources: Vec<FeedSource>,
    stale: HashMap<FeedSource, bool>,
    kill_engaged: bool,
    /// Positions awaiting settlement, for pairing trade records.
    unsettled: HashMap<PositionId, Position>,
}

impl Engine {
    pub fn new(config: &AppConfig, hub: Arc<FeedHub>, dashboard: DashboardState) -> AppResult<Self> {
        let round_clock = RoundClock::new(config.clock.schedule()?);
        let router = DecisionRouter::new(config.router.clone(), &config.composite)?;
        let risk = RiskGuard::new(
            config.risk.clone(),
            dashboard.kill_switch().clone(),
            Usd::new(config.execution.min_trade_usd),
        );
        let simulator = ExecutionSimulator::new(config.execution.clone())?;
        let settlement = Arc::new(SettlementEngine::new(config.settlement.clone())?);

        let mut watched_sources = vec![hub.primary_source()];
        watched_sources.extend(hub.secondary_source());
        if !watched_sources.contains(&hub.settlement_source()) {
            watched_sources.push(hub.settlement_source());
        }

        info!(
            strategies = ?router.strategy_order(),
            round_secs = round_clock.schedule().duration_secs(),
            activation_lead_secs = round_clock.schedule().activation_lead_secs(),
            "Engine initialized"
        );

        Ok(Self {
            kill_engaged: dashboard.kill_switch().is_engaged(),
            hub,
            dashboard,
            round_clock,
            router,
            risk,
            simulator,
            settlement,
            fetcher: Arc::new(HttpReferenceFetcher::default()),
            paper_log: None,
            move_detector: MoveDetector::new(MoveThresholds::default()),
            stale_after: config.feed.stale_after(),
            watched_sources,
            stale: HashMap::new(),
            unsettled: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_paper_log(mut self, writer: PaperLogWriter) -> Self {
        self.paper_log = Some(writer);
        self
    }

    #[must_use]
    pub fn with_reference_fetcher(mut self, fetcher: Arc<dyn ReferenceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn round_clock(&self) -> &RoundClock {
        &self.round_clock
    }

    pub fn risk(&self) -> &RiskGuard {
        &self.risk
    }

    pub fn settlement(&self) -> &Arc<SettlementEngine> {
        &self.settlement
    }

    pub fn dashboard(&self) -> &DashboardState {
        &self.dashboard
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Settle positions a previous process opened but never settled.
    ///
    /// Positions from the current or previous round also count against
    /// that round's risk limits again. Returns the number recovered.
    pub fn recover_orphans(&mut self, now_ms: i64) -> AppResult<usize> {
        let Some(path) = self.paper_log.as_ref().map(|w| w.path().to_path_buf()) else {
            return Ok(0);
        };
        let records = read_records(&path)?;

        let current_round = self.round_clock.schedule().current_round(now_ms).round_id;
        for record in &records {
            if let PaperRecord::PositionOpened(position) = record {
                if position.round_id + 1 >= current_round {
                    self.risk
                        .restore(position.round_id, position.opened_at_ms, position.notional_usd);
                }
            }
        }

        let orphans = find_orphans(&records);
        for position in &orphans {
            let settlement = self.settlement.recover_orphan(position, now_ms);
            warn!(
                position_id = %position.id,
                round_id = position.round_id,
                "Orphaned position settled invalid"
            );
            self.append(PaperRecord::PositionSettled(settlement.clone()));
            self.dashboard.record_settlement(position, settlement);
        }
        if !orphans.is_empty() {
            self.dashboard.push_event(EventEntry::new(
                now_ms,
                EventKind::PositionSettled,
                None,
                format!("{} orphaned position(s) settled invalid on restart", orphans.len()),
            ));
        }
        self.flush_paper_log();
        Ok(orphans.len())
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    pub fn cycle(&mut self, now_ms: i64) -> AppResult<CycleReport> {
        let mut report = CycleReport::default();

        for transition in self.round_clock.poll(now_ms) {
            match transition {
                RoundTransition::Closed(round) => self.on_round_closed(round, now_ms),
                RoundTransition::Activated(round) => self.on_round_activated(round, now_ms),
            }
            report.transitions.push(transition);
        }

        report.settled = self.settle(now_ms);
        self.check_feeds(now_ms);
        self.check_kill_switch(now_ms);

        let odds = self.hub.sample_odds(now_ms);
        if let Some(round) = self
            .round_clock
            .active_round()
            .filter(|r| r.is_active(now_ms) && !r.is_closed(now_ms))
        {
            self.evaluate(round, &odds, now_ms, &mut report);
        }
        self.observe_odds_move(&odds.snapshot, now_ms);

        self.publish(&odds.snapshot, now_ms);
        Ok(report)
    }

    fn on_round_activated(&mut self, round: Round, now_ms: i64) {
        info!(
            round_id = round.round_id,
            open_ts = round.open_ts,
            close_ts = round.close_ts,
            "Round activated"
        );
        Metrics::round_activated(round.round_id);
        self.hub.reset_signal(round.round_id);
        self.risk.prune(round.round_id);
        self.simulator.prune(round.round_id);
        self.fetcher
            .spawn_fetches(round, self.settlement.price_to_beat_book());
        self.dashboard.with_events(|log| {
            log.reset_dedupe();
            log.push(EventEntry::new(
                now_ms,
                EventKind::RoundActivated,
                Some(round.round_id),
                format!("{round} activated, {}s to close", round.seconds_to_close(now_ms)),
            ));
        });
    }

    fn on_round_closed(&mut self, round: Round, now_ms: i64) {
        info!(round_id = round.round_id, "Round closed");
        Metrics::round_closed();
        self.settlement.on_round_closed(&round);
        self.dashboard.push_event(EventEntry::new(
            now_ms,
            EventKind::RoundClosed,
            Some(round.round_id),
            format!("{round} closed"),
        ));
    }

    fn settle(&mut self, now_ms: i64) -> Vec<Settlement> {
        let settled = self.settlement.poll(now_ms, self.hub.as_ref());
        for settlement in &settled {
            self.append(PaperRecord::PositionSettled(settlement.clone()));
            if let Some(position) = self.unsettled.remove(&settlement.position_id) {
                self.dashboard.record_settlement(&position, settlement.clone());
            }
            self.dashboard.push_event(EventEntry::new(
                now_ms,
                EventKind::PositionSettled,
                Some(settlement.round_id),
                format!(
                    "{} {} {} net {}",
                    settlement.position_id,
                    settlement.action,
                    settlement.outcome,
                    settlement.net_pnl_usd.round_dp(4)
                ),
            ));
        }
        if !settled.is_empty() {
            self.flush_paper_log();
        }
        settled
    }

    fn check_feeds(&mut self, now_ms: i64) {
        for source in &self.watched_sources {
            let stale = self.hub.is_stale(*source, self.stale_after, now_ms);
            if self.stale.insert(*source, stale) == Some(stale) {
                continue;
            }
            Metrics::feed_stale(source.as_str(), stale);
            let message = if stale {
                warn!(source = %source, max_age_ms = self.stale_after.as_millis() as u64, "Feed stale");
                format!("{source} feed stale")
            } else {
                info!(source = %source, "Feed fresh");
                format!("{source} feed fresh")
            };
            self.dashboard
                .push_event(EventEntry::new(now_ms, EventKind::Feed, None, message));
        }
    }

    fn check_kill_switch(&mut self, now_ms: i64) {
        let status = self.risk.kill_switch().status();
        if status.engaged == self.kill_engaged {
            return;
        }
        self.kill_engaged = status.engaged;
        let message = match (status.engaged, status.reason) {
            (true, Some(reason)) => format!("kill switch engaged: {reason}"),
            (true, None) => "kill switch engaged".to_string(),
            (false, _) => "kill switch cleared".to_string(),
        };
        self.dashboard
            .push_event(EventEntry::new(now_ms, EventKind::KillSwitch, None, message));
    }

    // ========================================================================
    // Decision -> Intent -> Position
    // ========================================================================

    fn evaluate(&mut self, round: Round, odds: &OddsFeatures, now_ms: i64, report: &mut CycleReport) {
        let seconds_to_close = round.seconds_to_close(now_ms);
        let ctx = EvalContext::new(self.hub.features())
            .with_timing(seconds_to_close, round.duration_secs())
            .with_odds(
                odds.snapshot.clone(),
                odds.orderbook_imbalance,
                odds.trade_momentum,
            )
            .with_feed_divergence(self.hub.divergence_bps());

        let decision = self.router.evaluate(&ctx);
        self.dashboard.set_last_decision(decision.clone());
        report.decision = Some(decision.clone());

        if decision.is_trade() {
            self.record_opportunity(&round, &decision, &odds.snapshot, seconds_to_close, now_ms);
        } else if decision.odds_alignment == OddsAlignment::Against
            && decision.reason == "below_min_confidence"
        {
            let identity = format!("{}:{}", round.round_id, decision.strategy);
            self.dashboard.with_events(|log| {
                log.push_material(
                    EventEntry::new(
                        now_ms,
                        EventKind::OddsFilterBlock,
                        Some(round.round_id),
                        format!(
                            "{} signal against odds, confidence {:.3} ({})",
                            decision.strategy, decision.confidence, decision.reason
                        ),
                    ),
                    &identity,
                    decision.confidence,
                )
            });
        }

        let intent = match self.risk.allow(decision, round.round_id, now_ms) {
            Ok(intent) => intent,
            Err(RejectReason::NoTrade) => return,
            Err(reason) => {
                let identity = format!("{}:{}", round.round_id, reason);
                self.dashboard.with_events(|log| {
                    log.push_discrete(
                        EventEntry::new(
                            now_ms,
                            EventKind::RiskRejection,
                            Some(round.round_id),
                            format!("risk rejected: {reason}"),
                        ),
                        &identity,
                    )
                });
                report.rejection = Some(reason);
                return;
            }
        };

        let market = MarketView {
            odds: odds.snapshot.clone(),
            reference_price: self.hub.latest_tick().map(|t| t.price),
            seconds_to_close: Some(seconds_to_close),
            round_secs: Some(round.duration_secs()),
            notional_headroom: self.risk.notional_headroom(round.round_id),
        };
        match self.simulator.execute(&intent, &market, now_ms) {
            Ok(position) => {
                self.risk.commit_notional(round.round_id, position.notional_usd);
                self.settlement.register(round, position.clone());
                self.unsettled.insert(position.id.clone(), position.clone());
                self.append(PaperRecord::PositionOpened(position.clone()));
                self.flush_paper_log();
                self.dashboard.record_position(position.clone());
                self.dashboard.push_event(EventEntry::new(
                    now_ms,
                    EventKind::PositionOpened,
                    Some(round.round_id),
                    format!(
                        "{} {} @ {} notional {} cost {}bps",
                        position.id,
                        position.action,
                        position.entry_price,
                        position.notional_usd,
                        position.total_cost_bps.round_dp(2)
                    ),
                ));
                report.opened = Some(position);
            }
            Err(blocked) => {
                let identity = format!("{}:{}:{}", round.round_id, blocked.action, blocked.reason);
                let metric = blocked
                    .costs
                    .and_then(|c| c.net_edge_bps.to_f64())
                    .unwrap_or(0.0);
                self.dashboard.with_events(|log| {
                    log.push_material(
                        EventEntry::new(
                            now_ms,
                            EventKind::EconomicsBlock,
                            Some(round.round_id),
                            format!("{} blocked: {}", blocked.action, blocked.reason),
                        ),
                        &identity,
                        metric,
                    )
                });
                report.blocked = Some(blocked);
            }
        }
    }

    fn record_opportunity(
        &mut self,
        round: &Round,
        decision: &Decision,
        odds: &OddsSnapshot,
        seconds_to_close: i64,
        now_ms: i64,
    ) {
        let identity = format!("{}:{}:{}", round.round_id, decision.action, decision.strategy);
        let logged = self.dashboard.with_events(|log| {
            log.push_material(
                EventEntry::new(
                    now_ms,
                    EventKind::Opportunity,
                    Some(round.round_id),
                    format!(
                        "{} via {} confidence {:.3} score {:.3}",
                        decision.action, decision.strategy, decision.confidence, decision.score
                    ),
                ),
                &identity,
                decision.confidence,
            )
        });
        if !logged {
            return;
        }
        self.append(PaperRecord::Opportunity(OpportunityRecord {
            timestamp_ms: now_ms,
            round_id: round.round_id,
            action: decision.action,
            confidence: decision.confidence,
            score: decision.score,
            strategy: decision.strategy.clone(),
            reason: decision.reason.clone(),
            yes_price: odds.yes_price,
            no_price: odds.no_price,
            seconds_to_close,
        }));
    }

    fn observe_odds_move(&mut self, odds: &OddsSnapshot, now_ms: i64) {
        let Some(moved) = self.move_detector.observe(odds, now_ms) else {
            return;
        };
        let round_id = self
            .round_clock
            .active_round()
            .unwrap_or_else(|| self.round_clock.schedule().current_round(now_ms))
            .round_id;
        info!(
            round_id,
            slug = ?moved.slug,
            yes_from = ?moved.yes_from,
            yes_to = ?moved.yes_to,
            no_from = ?moved.no_from,
            no_to = ?moved.no_to,
            "Significant odds move"
        );
        self.append(PaperRecord::PriceMove(PriceMoveRecord {
            timestamp_ms: moved.observed_at_ms,
            round_id,
            market_slug: moved.slug,
            yes_from: moved.yes_from,
            yes_to: moved.yes_to,
            no_from: moved.no_from,
            no_to: moved.no_to,
            reference_price: self.hub.latest_tick().map(|t| t.price),
        }));
    }

    fn publish(&self, odds: &OddsSnapshot, now_ms: i64) {
        let round = self
            .round_clock
            .active_round()
            .unwrap_or_else(|| self.round_clock.schedule().current_round(now_ms));
        let price_to_beat = self
            .settlement
            .price_to_beat_book()
            .resolved(round.round_id);
        self.dashboard.set_round(Some(round), price_to_beat);
        self.dashboard
            .set_odds(odds.market_slug.is_some().then(|| odds.clone()));
        self.dashboard
            .set_book(self.settlement.open_count(), self.settlement.today(now_ms));
        if let Some(tick) = self.hub.latest_tick() {
            self.dashboard.set_latest_tick(tick);
        }
    }

    // ========================================================================
    // Paper log
    // ========================================================================

    /// Write failures are logged; paper trading continues without audit.
    fn append(&mut self, record: PaperRecord) {
        let Some(writer) = self.paper_log.as_mut() else {
            return;
        };
        let kind = record.kind();
        if let Err(e) = writer.append(record) {
            warn!(kind, ?e, "Failed to append paper log record");
        }
    }

    fn flush_paper_log(&mut self) {
        if let Some(writer) = self.paper_log.as_mut() {
            if let Err(e) = writer.flush() {
                warn!(?e, "Failed to flush paper log");
            }
        }
    }

    /// Flush and close the paper log.
    pub fn shutdown(&mut self) -> AppResult<()> {
        if let Some(writer) = self.paper_log.as_mut() {
            writer.close()?;
        }
        debug!(open_positions = self.settlement.open_count(), "Engine stopped");
        Ok(())
    }
}
