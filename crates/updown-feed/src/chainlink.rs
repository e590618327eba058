//! Oracle HTTP stream client.
//!
//! Authorizes with login/password, then reads the newline-delimited
//! streaming endpoint. Each session re-authorizes; failures back off the
//! same way WebSocket feeds do.

use crate::backoff::{sleep_or_cancel, Backoff};
use crate::connection::SessionEnd;
use crate::error::{FeedError, FeedResult};
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use updown_telemetry::Metrics;

const LABEL: &str = "chainlink";

/// Endpoint and credentials.
#[derive(Debug, Clone)]
pub struct ChainlinkCredentials {
    pub base_url: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    #[serde(default)]
    d: Option<AuthorizeData>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeData {
    #[serde(default)]
    access_token: Option<String>,
}

/// Authenticated client for the oracle REST and streaming endpoints.
#[derive(Debug, Clone)]
pub struct ChainlinkClient {
    http: reqwest::Client,
    credentials: ChainlinkCredentials,
}

impl ChainlinkClient {
    pub fn new(credentials: ChainlinkCredentials, timeout: Duration) -> FeedResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            credentials: ChainlinkCredentials {
                base_url: credentials.base_url.trim_end_matches('/').to_string(),
                ..credentials
            },
        })
    }

    pub fn base_url(&self) -> &str {
        &self.credentials.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Obtain a bearer token.
    pub async fn authorize(&self) -> FeedResult<String> {
        let url = format!("{}/api/v1/authorize", self.credentials.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("login", self.credentials.login.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::Unauthorized(format!(
                "authorize failed: HTTP {}",
                response.status()
            )));
        }

        let body: AuthorizeResponse = response.json().await?;
        body.d
            .and_then(|d| d.access_token)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FeedError::Unauthorized("missing access token".to_string()))
    }

    /// Stream lines for `symbol` until the server ends the response,
    /// `idle_timeout` passes without data, or shutdown.
    pub async fn stream_session<F>(
        &self,
        symbol: &str,
        idle_timeout: Duration,
        shutdown: &CancellationToken,
        on_line: &mut F,
    ) -> FeedResult<SessionEnd>
    where
        F: FnMut(&str) + Send,
    {
        let token = self.authorize().await?;
        let url = format!("{}/api/v1/streaming", self.credentials.base_url);
        let mut response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .bearer_auth(&token)
            .header(reqwest::header::CONNECTION, "keep-alive")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::ConnectionFailed(format!(
                "streaming HTTP {}",
                response.status()
            )));
        }

        Metrics::feed_connected(LABEL);
        info!(symbol, "Oracle stream connected");

        let mut buf: Vec<u8> = Vec::new();
        let result = loop {
            let chunk = tokio::select! {
                () = shutdown.cancelled() => break Ok(SessionEnd::Shutdown),
                chunk = tokio::time::timeout(idle_timeout, response.chunk()) => chunk,
            };

            match chunk {
                Err(_) => {
                    break Err(FeedError::ConnectionFailed(format!(
                        "no data for {}ms",
                        idle_timeout.as_millis()
                    )))
                }
                Ok(Err(e)) => break Err(e.into()),
                Ok(Ok(None)) => {
                    flush_line(&buf, on_line);
                    break Ok(SessionEnd::Closed);
                }
                Ok(Ok(Some(bytes))) => {
                    buf.extend_from_slice(&bytes);
                    drain_lines(&mut buf, on_line);
                }
            }
        };

        Metrics::feed_disconnected(LABEL);
        result
    }
}

/// Emit every complete line in `buf`, keeping the trailing partial line.
fn drain_lines<F: FnMut(&str)>(buf: &mut Vec<u8>, on_line: &mut F) {
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        flush_line(&line, on_line);
    }
}

fn flush_line<F: FnMut(&str)>(line: &[u8], on_line: &mut F) {
    if let Ok(text) = std::str::from_utf8(line) {
        let text = text.trim();
        if !text.is_empty() {
            on_line(text);
        }
    }
}

/// Reconnecting oracle stream.
pub struct ChainlinkStream {
    client: ChainlinkClient,
    symbol: String,
    idle_timeout: Duration,
    backoff: Backoff,
    reconnect_count: AtomicU32,
    shutdown_token: CancellationToken,
}

impl ChainlinkStream {
    pub fn new(
        client: ChainlinkClient,
        symbol: impl Into<String>,
        idle_timeout: Duration,
        backoff: Backoff,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            client,
            symbol: symbol.into(),
            idle_timeout,
            backoff,
            reconnect_count: AtomicU32::new(0),
            shutdown_token,
        }
    }

    /// Stream lines into `on_line` until shutdown or the reconnect budget
    /// is exhausted.
    pub async fn run<F>(&self, mut on_line: F) -> FeedResult<()>
    where
        F: FnMut(&str) + Send,
    {
        loop {
            if self.shutdown_token.is_cancelled() {
                return Ok(());
            }

            match self
                .client
                .stream_session(&self.symbol, self.idle_timeout, &self.shutdown_token, &mut on_line)
                .await
            {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(end) => {
                    self.reconnect_count.store(0, Ordering::Relaxed);
                    info!(?end, "Oracle stream ended");
                }
                Err(e) => error!(?e, "Oracle stream error"),
            }

            let attempt = self.reconnect_count.fetch_add(1, Ordering::Relaxed) + 1;
            if self.backoff.exhausted(attempt) {
                error!(attempt, "Max reconnection attempts reached");
                return Err(FeedError::ConnectionFailed(
                    "chainlink: max reconnection attempts reached".to_string(),
                ));
            }
            Metrics::feed_reconnect(LABEL);
            let delay = self.backoff.delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting oracle stream");
            if sleep_or_cancel(delay, &self.shutdown_token).await {
                debug!("Shutdown requested during backoff");
                return Ok(());
            }
        }
    }
}
