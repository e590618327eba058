//! Application wiring.
//!
//! Spawns the feed tasks and the dashboard, then drives the evaluation
//! loop on a fixed interval until ctrl-c.

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::engine::Engine;
use crate::error::{AppError, AppResult};
use crate::hub::FeedHub;
use crate::reference::HttpReferenceFetcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use updown_core::FeedSource;
use updown_dashboard::{run_server, DashboardState};
use updown_feed::{
    ChainlinkClient, ChainlinkStream, FeedNormalizer, MarketDiscovery, OddsStream, TickSink,
    WsConfig, WsFeedConnection,
};
use updown_persistence::PaperLogWriter;
use updown_risk::KillSwitch;
use updown_telemetry::Metrics;

pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn run(self) -> AppResult<()> {
        let config = self.config;
        let (round_secs, lead_secs) = config.clock.effective();
        info!(
            source = %config.feed.source,
            symbol = %config.feed.symbol,
            round_secs,
            lead_secs,
            test_mode = config.clock.test_mode,
            odds = config.odds.enabled,
            dashboard = config.dashboard.enabled,
            "Starting application"
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let hub = Arc::new(FeedHub::new(&config, clock.clone())?);
        let dashboard = DashboardState::new(&config.dashboard, Arc::new(KillSwitch::new()));

        let fetcher = HttpReferenceFetcher::from_config(&config.reference)?;
        if !fetcher.is_enabled() {
            warn!("No remote price-to-beat sources configured, falling back to streamed ticks");
        }
        let mut engine = Engine::new(&config, hub.clone(), dashboard.clone())?
            .with_reference_fetcher(Arc::new(fetcher));
        if config.paper_log.enabled {
            let writer = PaperLogWriter::new(&config.paper_log.path, config.paper_log.buffer_size)?;
            engine = engine.with_paper_log(writer);
        }
        let recovered = engine.recover_orphans(clock.now_ms())?;
        if recovered > 0 {
            warn!(recovered, "Recovered orphaned positions from paper log");
        }

        let shutdown = CancellationToken::new();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        handles.push(spawn_primary_feed(&config, hub.clone(), shutdown.clone())?);
        if let Some(source) = config.secondary_source() {
            handles.push(spawn_oracle_stream(
                &config,
                &config.reference.chainlink_symbol,
                hub.clone(),
                shutdown.clone(),
            )?);
            info!(%source, "Secondary reference stream enabled");
        }
        if config.odds.enabled {
            handles.push(spawn_odds_stream(&config, hub.clone(), shutdown.clone())?);
        }
        if config.dashboard.enabled {
            let state = dashboard.clone();
            let dashboard_config = config.dashboard.clone();
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = run_server(state, dashboard_config, token).await {
                    error!(?e, "Dashboard server failed");
                }
            }));
        }

        info!(
            interval_ms = config.clock.eval_interval_ms,
            "Entering evaluation loop"
        );
        let mut interval = tokio::time::interval(config.clock.eval_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let started = Instant::now();
                    match engine.cycle(clock.now_ms()) {
                        Ok(_) => Metrics::eval_cycle(started.elapsed().as_secs_f64() * 1_000.0),
                        Err(e) => {
                            warn!(?e, "Evaluation cycle failed");
                            Metrics::eval_cycle_error();
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = shutdown.cancelled() => {
                    break;
                }
            }
        }

        shutdown.cancel();
        engine.shutdown()?;
        for handle in handles {
            handle.abort();
        }
        info!("Shutdown complete");
        Ok(())
    }
}

fn spawn_primary_feed(
    config: &AppConfig,
    hub: Arc<FeedHub>,
    shutdown: CancellationToken,
) -> AppResult<JoinHandle<()>> {
    if config.feed.source == FeedSource::Chainlink {
        return spawn_oracle_stream(config, &config.feed.symbol, hub, shutdown);
    }

    let ws_config = config.feed.ws_config()?;
    let normalizer = FeedNormalizer::new(config.feed.source, &config.feed.symbol);
    let connection = WsFeedConnection::new(ws_config, shutdown);
    Ok(tokio::spawn(async move {
        let result = connection
            .run(|raw| {
                if let Some(tick) = normalizer.ingest(raw) {
                    hub.on_tick(tick);
                }
            })
            .await;
        if let Err(e) = result {
            error!(?e, source = %normalizer.source(), "Primary feed stopped");
        }
    }))
}

fn spawn_oracle_stream(
    config: &AppConfig,
    symbol: &str,
    hub: Arc<FeedHub>,
    shutdown: CancellationToken,
) -> AppResult<JoinHandle<()>> {
    let credentials = config
        .reference
        .chainlink_credentials()
        .ok_or_else(|| AppError::Config("oracle stream requires credentials".to_string()))?;
    let client = ChainlinkClient::new(credentials, config.reference.http_timeout())?;
    let stream = ChainlinkStream::new(
        client,
        symbol,
        Duration::from_millis(config.feed.idle_timeout_ms),
        config.feed.backoff,
        shutdown,
    );
    let normalizer = FeedNormalizer::new(FeedSource::Chainlink, symbol);
    Ok(tokio::spawn(async move {
        let result = stream
            .run(|line| {
                if let Some(tick) = normalizer.ingest(line) {
                    hub.on_tick(tick);
                }
            })
            .await;
        if let Err(e) = result {
            error!(?e, "Oracle stream stopped");
        }
    }))
}

fn spawn_odds_stream(
    config: &AppConfig,
    hub: Arc<FeedHub>,
    shutdown: CancellationToken,
) -> AppResult<JoinHandle<()>> {
    let timeout = Duration::from_millis(config.odds.http_timeout_ms);
    let (round_secs, _) = config.clock.effective();
    let discovery = MarketDiscovery::new(
        &config.odds.gamma_base_url,
        &config.odds.slug_prefix,
        round_secs,
        timeout,
    )?;
    let connection = WsFeedConnection::new(
        WsConfig {
            label: "odds".to_string(),
            url: config.odds.ws_url.clone(),
            subscribe: None,
            ping_interval_ms: config.feed.ping_interval_ms,
            idle_timeout_ms: config.feed.idle_timeout_ms,
            backoff: config.feed.backoff,
        },
        shutdown.clone(),
    );
    let stream = OddsStream::new(
        discovery,
        connection,
        Duration::from_secs(config.odds.market_refresh_seconds),
        shutdown,
    );
    Ok(tokio::spawn(async move {
        if let Err(e) = stream.run(hub.as_ref()).await {
            error!(?e, "Odds stream stopped");
        }
    }))
}
