//! Round lifecycle integration tests.
//!
//! Drives the engine with a manual clock through one 900s round
//! (round 2: open 1800s, activation 2520s, close 2700s):
//! - decisions, risk gating and paper execution
//! - settlement against the price to beat
//! - orphan recovery from the paper log

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::TempDir;
use updown_bot::{AppConfig, Clock, Engine, FeedHub, ManualClock};
use updown_core::{
    Action, FeedSource, OddsAlignment, Outcome, PositionId, Price, PriceToBeatTier,
    RoundTransition, Tick, Usd,
};
use updown_dashboard::{DashboardState, EventKind};
use updown_feed::{ActiveMarket, OddsSink, TickSink};
use updown_persistence::{read_records, PaperLogWriter, PaperRecord};
use updown_risk::{KillSwitch, RejectReason};

const ROUND: u64 = 2;
const PRE_OPEN_MS: i64 = 1_799_000;
const ACTIVATION_MS: i64 = 2_520_000;
const CLOSE_MS: i64 = 2_700_000;

struct Harness {
    clock: Arc<ManualClock>,
    hub: Arc<FeedHub>,
    engine: Engine,
}

impl Harness {
    fn new(paper_log: Option<PaperLogWriter>) -> Self {
        Self::with_config(AppConfig::default(), paper_log)
    }

    fn with_config(config: AppConfig, paper_log: Option<PaperLogWriter>) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let hub = Arc::new(FeedHub::new(&config, clock.clone()).unwrap());
        let dashboard = DashboardState::new(&config.dashboard, Arc::new(KillSwitch::new()));
        let mut engine = Engine::new(&config, hub.clone(), dashboard).unwrap();
        if let Some(writer) = paper_log {
            engine = engine.with_paper_log(writer);
        }
        Self { clock, hub, engine }
    }

    fn tick(&self, price: Decimal, ts_ms: i64) {
        self.clock.set(ts_ms);
        self.hub
            .on_tick(Tick::new(FeedSource::Binance, "BTCUSDT", Price::new(price), ts_ms));
    }

    fn odds(&self, yes: &str, no: &str) {
        self.hub.on_market(ActiveMarket {
            slug: "btc-updown-15m-1800".to_string(),
            yes_token: "111".to_string(),
            no_token: "222".to_string(),
        });
        self.hub.on_frame(&format!(
            r#"[{{"asset_id":"111","price":"{yes}"}},{{"asset_id":"222","price":"{no}"}}]"#
        ));
    }

    fn cycle(&mut self, now_ms: i64) -> updown_bot::CycleReport {
        self.clock.set(now_ms);
        self.engine.cycle(now_ms).unwrap()
    }

    /// Reference ticks, activation, then a steady climb of 0.7%.
    fn activate_with_uptrend(&mut self) {
        self.tick(dec!(100), PRE_OPEN_MS);
        self.tick(dec!(100.2), 1_900_000);

        let report = self.cycle(ACTIVATION_MS);
        assert!(matches!(
            report.transitions.as_slice(),
            [RoundTransition::Activated(r)] if r.round_id == ROUND
        ));
        assert!(report.decision.is_some());

        for i in 0..8 {
            let price = dec!(100) + Decimal::from(i) * dec!(0.1);
            self.tick(price, ACTIVATION_MS + 100 + i * 100);
        }
    }

    fn events(&self, kind: EventKind) -> usize {
        self.engine
            .dashboard()
            .with_events(|log| log.entries().iter().filter(|e| e.kind == kind).count())
    }
}

#[test]
fn test_no_decision_before_activation() {
    let mut h = Harness::new(None);
    h.tick(dec!(100), PRE_OPEN_MS);

    let report = h.cycle(2_000_000);
    assert!(report.transitions.is_empty());
    assert!(report.decision.is_none());
    assert!(report.opened.is_none());
}

#[test]
fn test_trades_respect_cooldown_and_round_limit() {
    let mut h = Harness::new(None);
    h.activate_with_uptrend();
    h.odds("0.60", "0.40");

    let first = h.cycle(2_521_000);
    let decision = first.decision.unwrap();
    assert_eq!(decision.action, Action::BuyYes);
    assert_eq!(decision.strategy, "momentum");
    assert_eq!(decision.odds_alignment, OddsAlignment::Supportive);
    let position = first.opened.unwrap();
    assert_eq!(position.id, PositionId::new("2-1"));
    assert_eq!(position.entry_price, Price::new(dec!(0.60)));

    let cooling = h.cycle(2_525_000);
    assert_eq!(cooling.rejection, Some(RejectReason::CooldownActive));
    assert!(cooling.opened.is_none());

    let second = h.cycle(2_530_000);
    assert_eq!(second.opened.unwrap().id, PositionId::new("2-2"));

    let capped = h.cycle(2_540_000);
    assert_eq!(capped.rejection, Some(RejectReason::RoundTradeLimit));
    assert_eq!(h.engine.settlement().open_count(), 2);
    assert_eq!(h.engine.risk().counters(ROUND).trades, 2);

    // One opportunity event per material change, not per cycle
    assert_eq!(h.events(EventKind::Opportunity), 1);
    assert_eq!(h.events(EventKind::PositionOpened), 2);
}

#[test]
fn test_position_size_stays_under_round_notional_cap() {
    let mut config = AppConfig::default();
    config.risk.max_round_notional_usd = Some(dec!(15));
    let mut h = Harness::with_config(config, None);
    h.activate_with_uptrend();
    // Wide book: unbounded sizing would be 0.5 * 0.7 * 100 = 35
    h.odds("0.80", "0.10");

    let position = h.cycle(2_521_000).opened.unwrap();
    assert_eq!(position.notional_usd, Usd::new(dec!(15)));

    let capped = h.cycle(2_530_000);
    assert_eq!(capped.rejection, Some(RejectReason::RoundNotionalLimit));
    assert!(capped.opened.is_none());

    let committed = h.engine.risk().counters(ROUND).committed_notional;
    assert!(committed <= Usd::new(dec!(15)));
}

#[test]
fn test_odds_against_signal_blocks_on_confidence() {
    let mut h = Harness::new(None);
    h.activate_with_uptrend();
    h.odds("0.40", "0.60");

    let report = h.cycle(2_521_000);
    let decision = report.decision.unwrap();
    assert_eq!(decision.action, Action::None);
    assert_eq!(decision.reason, "below_min_confidence");
    assert_eq!(decision.odds_alignment, OddsAlignment::Against);
    assert!(report.opened.is_none());
    assert!(report.rejection.is_none());
    assert_eq!(h.events(EventKind::OddsFilterBlock), 1);
}

#[test]
fn test_missing_odds_blocks_execution() {
    let mut h = Harness::new(None);
    h.activate_with_uptrend();

    let report = h.cycle(2_521_000);
    assert_eq!(report.decision.unwrap().odds_alignment, OddsAlignment::Unknown);
    assert!(report.opened.is_none());
    assert!(report.blocked.is_some());
    assert_eq!(h.events(EventKind::EconomicsBlock), 1);
}

#[test]
fn test_kill_switch_stops_new_positions() {
    let mut h = Harness::new(None);
    h.engine.dashboard().kill_switch().engage("manual");
    h.activate_with_uptrend();
    h.odds("0.60", "0.40");

    let report = h.cycle(2_521_000);
    assert_eq!(report.rejection, Some(RejectReason::KillSwitchActive));
    assert!(report.opened.is_none());
    assert_eq!(h.events(EventKind::KillSwitch), 1);

    h.engine.dashboard().kill_switch().clear();
    let report = h.cycle(2_522_000);
    assert!(report.opened.is_some());
    assert_eq!(h.events(EventKind::KillSwitch), 2);
}

#[test]
fn test_round_settles_against_price_to_beat() {
    let mut h = Harness::new(None);
    h.activate_with_uptrend();
    h.odds("0.60", "0.40");
    h.cycle(2_521_000);
    h.cycle(2_530_000);

    // Close price is known only once a tick at or after the close arrives
    let report = h.cycle(CLOSE_MS + 100);
    assert!(matches!(
        report.transitions.as_slice(),
        [RoundTransition::Closed(r)] if r.round_id == ROUND
    ));
    assert!(report.settled.is_empty());

    h.tick(dec!(101), CLOSE_MS);
    let report = h.cycle(CLOSE_MS + 600);
    assert_eq!(report.settled.len(), 2);
    for settlement in &report.settled {
        assert_eq!(settlement.outcome, Outcome::Win);
        assert_eq!(settlement.close_price, Some(Price::new(dec!(101))));
        let ptb = settlement.price_to_beat.unwrap();
        assert_eq!(ptb.value, Price::new(dec!(100)));
        assert_eq!(ptb.source_rank, PriceToBeatTier::LastTickBeforeOpen);
    }

    assert_eq!(h.engine.settlement().open_count(), 0);
    assert!(h.cycle(CLOSE_MS + 1_100).settled.is_empty());

    let trades = h.engine.dashboard().paper_trades();
    assert_eq!(trades.len(), 2);
    assert!(trades.iter().all(|t| t.settlement.is_some()));
}

#[test]
fn test_missing_close_settles_invalid_after_grace() {
    let mut h = Harness::new(None);
    h.activate_with_uptrend();
    h.odds("0.60", "0.40");
    h.cycle(2_521_000);

    assert!(h.cycle(CLOSE_MS + 500).settled.is_empty());
    assert!(h.cycle(CLOSE_MS + 20_000).settled.is_empty());

    let report = h.cycle(CLOSE_MS + 30_000);
    assert_eq!(report.settled.len(), 1);
    assert_eq!(report.settled[0].outcome, Outcome::Invalid);
    assert!(report.settled[0].gross_pnl_usd.is_zero());
    assert_eq!(
        report.settled[0].invalid_reason.as_deref(),
        Some("close_price_unavailable")
    );
}

#[test]
fn test_restart_settles_orphans_and_keeps_round_limits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper_trades.jsonl");

    {
        let mut h = Harness::new(Some(PaperLogWriter::new(&path, 1).unwrap()));
        h.activate_with_uptrend();
        h.odds("0.60", "0.40");
        assert!(h.cycle(2_521_000).opened.is_some());
    }

    {
        let mut h = Harness::new(Some(PaperLogWriter::new(&path, 1).unwrap()));
        assert_eq!(h.engine.recover_orphans(2_525_000).unwrap(), 1);
        assert_eq!(h.engine.risk().counters(ROUND).trades, 1);
        let orphan = h
            .engine
            .settlement()
            .settlement(&PositionId::new("2-1"))
            .unwrap();
        assert_eq!(orphan.outcome, Outcome::Invalid);
    }

    // Nothing left to settle, but the round still remembers its trade
    let mut h = Harness::new(Some(PaperLogWriter::new(&path, 1).unwrap()));
    assert_eq!(h.engine.recover_orphans(2_526_000).unwrap(), 0);
    assert_eq!(h.engine.risk().counters(ROUND).trades, 1);

    h.activate_with_uptrend();
    h.odds("0.60", "0.40");
    let report = h.cycle(h.clock.now_ms() + 10_000);
    assert_eq!(report.opened.unwrap().id, PositionId::new("2-2"));
    h.engine.shutdown().unwrap();

    let records = read_records(&path).unwrap();
    let kinds: Vec<_> = records
        .iter()
        .filter(|r| {
            matches!(
                r,
                PaperRecord::PositionOpened(_) | PaperRecord::PositionSettled(_)
            )
        })
        .map(PaperRecord::kind)
        .collect();
    assert_eq!(kinds, ["position_opened", "position_settled", "position_opened"]);
}
