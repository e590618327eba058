//! Round-open reference fetches for the price-to-beat tiers 1 and 2.

use crate::config::ReferenceConfig;
use crate::error::AppResult;
use std::sync::Arc;
use tracing::{debug, warn};
use updown_core::{PriceToBeatTier, Round};
use updown_feed::{CandleHistoryClient, ChainlinkClient, KlineClient};
use updown_settlement::{PriceToBeatBook, ReferenceReport};

/// Starts the remote lookups for a newly activated round.
///
/// Implementations must not block: results are reported back through
/// the book's channel.
pub trait ReferenceFetcher: Send + Sync {
    fn spawn_fetches(&self, round: Round, book: &Arc<PriceToBeatBook>);
}

/// Fetches the historical oracle candle and the exchange kline over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpReferenceFetcher {
    history: Option<CandleHistoryClient>,
    kline: Option<KlineClient>,
}

impl HttpReferenceFetcher {
    pub fn from_config(config: &ReferenceConfig) -> AppResult<Self> {
        let timeout = config.http_timeout();
        let history = match config.chainlink_credentials() {
            Some(credentials) => {
                let client = ChainlinkClient::new(credentials, timeout)?;
                Some(CandleHistoryClient::new(client, &config.chainlink_symbol, timeout))
            }
            None => {
                debug!("No oracle credentials, historical candle tier disabled");
                None
            }
        };
        let kline = config
            .kline_enabled
            .then(|| KlineClient::new(&config.kline_base_url, &config.kline_symbol, timeout))
            .transpose()?;
        Ok(Self { history, kline })
    }

    pub fn is_enabled(&self) -> bool {
        self.history.is_some() || self.kline.is_some()
    }
}

impl ReferenceFetcher for HttpReferenceFetcher {
    fn spawn_fetches(&self, round: Round, book: &Arc<PriceToBeatBook>) {
        if let Some(history) = self.history.clone() {
            let tx = book.expect(round.round_id, PriceToBeatTier::HistoricalCandle);
            tokio::spawn(async move {
                let price = match history.open_price(round.open_ts).await {
                    Ok(price) => price,
                    Err(e) => {
                        warn!(round_id = round.round_id, ?e, "Historical candle fetch failed");
                        None
                    }
                };
                let _ = tx.send(ReferenceReport {
                    round_id: round.round_id,
                    tier: PriceToBeatTier::HistoricalCandle,
                    price,
                });
            });
        }

        if let Some(kline) = self.kline.clone() {
            let tx = book.expect(round.round_id, PriceToBeatTier::ExchangeKline);
            tokio::spawn(async move {
                let price = match kline.open_price(round.open_ts, round.duration_secs()).await {
                    Ok(price) => price,
                    Err(e) => {
                        warn!(round_id = round.round_id, ?e, "Kline fetch failed");
                        None
                    }
                };
                let _ = tx.send(ReferenceReport {
                    round_id: round.round_id,
                    tier: PriceToBeatTier::ExchangeKline,
                    price,
                });
            });
        }
    }
}
