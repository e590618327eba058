//! WebSocket feed connection.
//!
//! Handles connection lifecycle, subscription on connect, keep-alive pings
//! and automatic reconnection with exponential backoff. Reconnects resume
//! the live stream without replaying missed frames.

use crate::backoff::{sleep_or_cancel, Backoff};
use crate::error::{FeedError, FeedResult};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use updown_telemetry::Metrics;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Label used for logs and metrics (e.g. "binance").
    pub label: String,
    /// WebSocket URL.
    pub url: String,
    /// Text frame sent right after connecting.
    pub subscribe: Option<String>,
    /// Client ping interval.
    pub ping_interval_ms: u64,
    /// Connection is considered dead after this long without any frame.
    pub idle_timeout_ms: u64,
    pub backoff: Backoff,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            label: "ws".to_string(),
            url: String::new(),
            subscribe: None,
            ping_interval_ms: 15_000,
            idle_timeout_ms: 60_000,
            backoff: Backoff::default(),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// How a single session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server closed or the stream ended.
    Closed,
    /// The session deadline elapsed.
    Deadline,
    /// Shutdown was requested.
    Shutdown,
}

/// Reconnecting WebSocket reader.
pub struct WsFeedConnection {
    config: WsConfig,
    state: RwLock<ConnectionState>,
    reconnect_count: AtomicU32,
    shutdown_token: CancellationToken,
}

impl WsFeedConnection {
    pub fn new(config: WsConfig, shutdown_token: CancellationToken) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            reconnect_count: AtomicU32::new(0),
            shutdown_token,
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed sessions since the last successful connect.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!(feed = %self.config.label, "Feed shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and stream text frames into `on_text` until shutdown.
    ///
    /// Only returns an error when the reconnect budget is exhausted.
    pub async fn run<F>(&self, mut on_text: F) -> FeedResult<()>
    where
        F: FnMut(&str) + Send,
    {
        let subscribe = self.config.subscribe.clone();
        loop {
            if self.is_shutdown() {
                info!(feed = %self.config.label, "Shutdown requested, exiting connect loop");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            match self.run_session(subscribe.as_deref(), None, &mut on_text).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(end) => info!(feed = %self.config.label, ?end, "WebSocket session ended"),
                Err(e) => error!(feed = %self.config.label, ?e, "WebSocket connection error"),
            }

            if !self.wait_before_reconnect().await? {
                return Ok(());
            }
        }
    }

    /// Back off after a failed or closed session.
    ///
    /// Returns `Ok(false)` if shutdown was requested while waiting.
    pub async fn wait_before_reconnect(&self) -> FeedResult<bool> {
        if self.is_shutdown() {
            *self.state.write() = ConnectionState::Disconnected;
            return Ok(false);
        }

        let attempt = self.reconnect_count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.backoff.exhausted(attempt) {
            error!(feed = %self.config.label, attempt, "Max reconnection attempts reached");
            *self.state.write() = ConnectionState::Disconnected;
            return Err(FeedError::ConnectionFailed(format!(
                "{}: max reconnection attempts reached",
                self.config.label
            )));
        }

        *self.state.write() = ConnectionState::Reconnecting;
        Metrics::feed_reconnect(&self.config.label);
        let delay = self.config.backoff.delay(attempt);
        warn!(feed = %self.config.label, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

        if sleep_or_cancel(delay, &self.shutdown_token).await {
            info!(feed = %self.config.label, "Shutdown requested during backoff, exiting");
            *self.state.write() = ConnectionState::Disconnected;
            return Ok(false);
        }
        Ok(true)
    }

    /// Run one connection: connect, subscribe, read until close, error,
    /// `deadline` or shutdown.
    pub async fn run_session<F>(
        &self,
        subscribe: Option<&str>,
        deadline: Option<Duration>,
        on_text: &mut F,
    ) -> FeedResult<SessionEnd>
    where
        F: FnMut(&str) + Send,
    {
        *self.state.write() = ConnectionState::Connecting;
        info!(feed = %self.config.label, url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        self.reconnect_count.store(0, Ordering::Relaxed);
        Metrics::feed_connected(&self.config.label);
        info!(feed = %self.config.label, "WebSocket connected");

        if let Some(msg) = subscribe {
            write.send(Message::Text(msg.to_string())).await?;
            debug!(feed = %self.config.label, "Subscription sent");
        }

        let session_deadline = deadline.map(|d| Instant::now() + d);
        let idle_timeout = Duration::from_millis(self.config.idle_timeout_ms);
        let mut ping = tokio::time::interval(Duration::from_millis(
            self.config.ping_interval_ms.max(1),
        ));
        ping.tick().await;
        let mut last_frame = Instant::now();

        let result = loop {
            let until_deadline = async {
                match session_deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!(feed = %self.config.label, "Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    break Ok(SessionEnd::Shutdown);
                }

                () = until_deadline => {
                    debug!(feed = %self.config.label, "Session deadline reached");
                    let _ = write.send(Message::Close(None)).await;
                    break Ok(SessionEnd::Deadline);
                }

                msg = read.next() => {
                    last_frame = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => on_text(&text),
                        Some(Ok(Message::Binary(data))) => {
                            if let Ok(text) = std::str::from_utf8(&data) {
                                on_text(text);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(feed = %self.config.label, code, %reason, "WebSocket closed by server");
                            break Err(FeedError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => break Err(e.into()),
                        None => {
                            warn!(feed = %self.config.label, "WebSocket stream ended");
                            break Ok(SessionEnd::Closed);
                        }
                        _ => {}
                    }
                }

                _ = ping.tick() => {
                    if last_frame.elapsed() > idle_timeout {
                        break Err(FeedError::ConnectionFailed(format!(
                            "{}: no frames for {}ms",
                            self.config.label, self.config.idle_timeout_ms
                        )));
                    }
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        break Err(e.into());
                    }
                }
            }
        };

        Metrics::feed_disconnected(&self.config.label);
        *self.state.write() = ConnectionState::Disconnected;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(backoff: Backoff) -> WsFeedConnection {
        WsFeedConnection::new(
            WsConfig {
                label: "test".to_string(),
                url: "ws://127.0.0.1:9".to_string(),
                backoff,
                ..WsConfig::default()
            },
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_initial_state() {
        let conn = connection(Backoff::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.reconnect_count(), 0);
        assert!(!conn.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_before_reconnect_exhausts_budget() {
        let conn = connection(Backoff {
            base_delay_ms: 1,
            max_delay_ms: 1,
            max_attempts: 2,
        });
        // First failure still retries (jitter up to 1s).
        assert!(conn.wait_before_reconnect().await.unwrap());
        assert!(matches!(
            conn.wait_before_reconnect().await,
            Err(FeedError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_before_reconnect_respects_shutdown() {
        let conn = connection(Backoff::default());
        conn.shutdown();
        assert!(!conn.wait_before_reconnect().await.unwrap());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown() {
        let conn = connection(Backoff::default());
        conn.shutdown();
        let mut seen = 0;
        conn.run(|_| seen += 1).await.unwrap();
        assert_eq!(seen, 0);
    }
}
