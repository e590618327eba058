//! Order-book odds stream with periodic market discovery.
//!
//! The active market rotates every window, so the stream re-resolves it
//! every `refresh` interval and reconnects with the new subscription.

use crate::backoff::sleep_or_cancel;
use crate::connection::{SessionEnd, WsFeedConnection};
use crate::error::{FeedError, FeedResult};
use crate::odds::{collect_token_ids, ActiveMarket};
use crate::sink::OddsSink;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default market-discovery endpoint.
pub const DEFAULT_GAMMA_BASE_URL: &str = "https://gamma-api.polymarket.com";

/// Resolves the active market by probing window-aligned slugs.
#[derive(Debug, Clone)]
pub struct MarketDiscovery {
    http: reqwest::Client,
    base_url: String,
    slug_prefix: String,
    window_secs: i64,
}

impl MarketDiscovery {
    pub fn new(
        base_url: &str,
        slug_prefix: &str,
        window_secs: i64,
        timeout: Duration,
    ) -> FeedResult<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            slug_prefix: slug_prefix.trim_end_matches('-').to_string(),
            window_secs: window_secs.max(1),
        })
    }

    /// Slugs to probe, in order: current, previous two, next window.
    pub fn candidate_slugs(&self, now_secs: i64) -> Vec<String> {
        let w = self.window_secs;
        let aligned = now_secs.div_euclid(w) * w;
        [aligned, aligned - w, aligned - 2 * w, aligned + w]
            .iter()
            .map(|ts| format!("{}-{}", self.slug_prefix, ts))
            .collect()
    }

    /// First candidate slug with two token ids.
    pub async fn find_active_market(&self, now_secs: i64) -> FeedResult<ActiveMarket> {
        for slug in self.candidate_slugs(now_secs) {
            match self.lookup_slug(&slug).await {
                Ok(Some(market)) => return Ok(market),
                Ok(None) => debug!(%slug, "No tradable market for slug"),
                Err(e) => debug!(%slug, ?e, "Market lookup failed"),
            }
        }
        Err(FeedError::NoActiveMarket(self.slug_prefix.clone()))
    }

    async fn lookup_slug(&self, slug: &str) -> FeedResult<Option<ActiveMarket>> {
        let response = self
            .http
            .get(format!("{}/markets/slug/{}", self.base_url, slug))
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let payload: Value = response.json().await?;
        Ok(market_from_payload(slug, &payload))
    }
}

/// Build a market from a discovery payload. The first two token ids are
/// taken as YES and NO.
pub fn market_from_payload(slug: &str, payload: &Value) -> Option<ActiveMarket> {
    let mut tokens = collect_token_ids(payload).into_iter();
    let yes_token = tokens.next()?;
    let no_token = tokens.next()?;
    Some(ActiveMarket {
        slug: slug.to_string(),
        yes_token,
        no_token,
    })
}

/// Market-channel subscription frame.
pub fn subscribe_message(market: &ActiveMarket) -> String {
    json!({
        "type": "market",
        "assets_ids": [market.yes_token, market.no_token],
    })
    .to_string()
}

/// Odds stream task.
pub struct OddsStream {
    discovery: MarketDiscovery,
    connection: WsFeedConnection,
    refresh: Duration,
    shutdown_token: CancellationToken,
}

impl OddsStream {
    pub fn new(
        discovery: MarketDiscovery,
        connection: WsFeedConnection,
        refresh: Duration,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            discovery,
            connection,
            refresh,
            shutdown_token,
        }
    }

    /// Discover, subscribe and stream until shutdown.
    pub async fn run(&self, sink: &dyn OddsSink) -> FeedResult<()> {
        let mut current: Option<ActiveMarket> = None;

        while !self.shutdown_token.is_cancelled() {
            let now_secs = chrono::Utc::now().timestamp();
            let market = match self.discovery.find_active_market(now_secs).await {
                Ok(market) => market,
                Err(e) => {
                    warn!(?e, retry_secs = self.refresh.as_secs(), "No active market found");
                    if sleep_or_cancel(self.refresh, &self.shutdown_token).await {
                        break;
                    }
                    continue;
                }
            };

            if current.as_ref() != Some(&market) {
                info!(slug = %market.slug, "Active market");
                sink.on_market(market.clone());
                current = Some(market.clone());
            }

            let subscribe = subscribe_message(&market);
            let mut on_text = |raw: &str| sink.on_frame(raw);
            match self
                .connection
                .run_session(Some(&subscribe), Some(self.refresh), &mut on_text)
                .await
            {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Deadline) => continue,
                Ok(SessionEnd::Closed) => {}
                Err(e) => warn!(?e, "Odds stream error"),
            }

            if !self.connection.wait_before_reconnect().await? {
                break;
            }
        }

        info!("Odds stream stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn discovery() -> MarketDiscovery {
        MarketDiscovery::new(
            DEFAULT_GAMMA_BASE_URL,
            "btc-updown-15m",
            900,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_candidate_slugs_order() {
        let slugs = discovery().candidate_slugs(1_700_000_123);
        let aligned = 1_700_000_123 / 900 * 900;
        assert_eq!(
            slugs,
            vec![
                format!("btc-updown-15m-{}", aligned),
                format!("btc-updown-15m-{}", aligned - 900),
                format!("btc-updown-15m-{}", aligned - 1800),
                format!("btc-updown-15m-{}", aligned + 900),
            ]
        );
    }

    #[test]
    fn test_market_from_payload() {
        let payload = json!({"clobTokenIds": "[\"123456789\", \"987654321\"]"});
        let market = market_from_payload("btc-updown-15m-0", &payload).unwrap();
        assert_eq!(market.yes_token, "123456789");
        assert_eq!(market.no_token, "987654321");

        assert!(market_from_payload("x", &json!({"clobTokenIds": "[\"123456789\"]"})).is_none());
    }

    #[test]
    fn test_subscribe_message() {
        let market = ActiveMarket {
            slug: "s".to_string(),
            yes_token: "111".to_string(),
            no_token: "222".to_string(),
        };
        let msg: Value = serde_json::from_str(&subscribe_message(&market)).unwrap();
        assert_eq!(msg["type"], "market");
        assert_eq!(msg["assets_ids"], json!(["111", "222"]));
    }
}
