//! WebSocket feed lifecycle tests against a local mock server:
//! - subscribe and stream frames into the normalizer
//! - reconnect after the server drops the session
//! - graceful shutdown

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use updown_core::FeedSource;
use updown_feed::{Backoff, ConnectionState, FeedNormalizer, WsConfig, WsFeedConnection};

const TRADE: &str = r#"{"e":"trade","E":1700000000100,"s":"BTCUSDT","t":1,"p":"64000.50","q":"0.01","T":1700000000000}"#;

/// Accepts connections, sends `frames`, then either closes or idles.
struct MockFeedServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockFeedServer {
    async fn start(frames: Vec<String>, close_after_send: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0u32));

        let (received_c, connections_c) = (received.clone(), connections.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let frames = frames.clone();
                let received = received_c.clone();
                *connections_c.lock().await += 1;
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(stream).await else {
                        return;
                    };
                    let (mut write, mut read) = ws.split();
                    tokio::spawn(async move {
                        while let Some(Ok(msg)) = read.next().await {
                            if let Message::Text(text) = msg {
                                received.lock().await.push(text.to_string());
                            }
                        }
                    });
                    for frame in frames {
                        if write.send(Message::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    if close_after_send {
                        let _ = write.send(Message::Close(None)).await;
                    } else {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                });
            }
        });

        Self {
            addr,
            received,
            connections,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }
}

fn ws_config(url: String, subscribe: Option<&str>) -> WsConfig {
    WsConfig {
        label: "mock".to_string(),
        url,
        subscribe: subscribe.map(str::to_string),
        ping_interval_ms: 1_000,
        idle_timeout_ms: 5_000,
        backoff: Backoff {
            base_delay_ms: 20,
            max_delay_ms: 50,
            max_attempts: 0,
        },
    }
}

#[tokio::test]
async fn test_frames_reach_the_normalizer() {
    let server = MockFeedServer::start(vec!["not json".to_string(), TRADE.to_string()], false).await;
    let token = CancellationToken::new();
    let connection = Arc::new(WsFeedConnection::new(
        ws_config(server.url(), Some(r#"{"method":"SUBSCRIBE"}"#)),
        token.clone(),
    ));
    let normalizer = Arc::new(FeedNormalizer::new(FeedSource::Binance, "btcusdt"));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let (conn, norm) = (connection.clone(), normalizer.clone());
    let handle = tokio::spawn(async move {
        conn.run(move |raw| {
            if let Some(tick) = norm.ingest(raw) {
                let _ = tx.send(tick);
            }
        })
        .await
    });

    let tick = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("tick within timeout")
        .unwrap();
    assert_eq!(tick.symbol, "BTCUSDT");
    assert_eq!(tick.observed_at_ms, 1_700_000_000_000);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(normalizer.stats().rejected(), 1);

    timeout(Duration::from_secs(2), async {
        while server.received.lock().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("subscription within timeout");
    assert_eq!(server.received.lock().await[0], r#"{"method":"SUBSCRIBE"}"#);

    token.cancel();
    let result = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let server = MockFeedServer::start(vec![TRADE.to_string()], true).await;
    let token = CancellationToken::new();
    let connection = Arc::new(WsFeedConnection::new(ws_config(server.url(), None), token.clone()));

    let conn = connection.clone();
    let handle = tokio::spawn(async move { conn.run(|_| {}).await });

    let reconnected = timeout(Duration::from_secs(3), async {
        while server.connection_count().await < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "should reconnect after the server closes");

    token.cancel();
    let result = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    // Nothing listens on this port once the listener is dropped
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut config = ws_config(url, None);
    config.backoff.max_attempts = 2;
    let connection = WsFeedConnection::new(config, CancellationToken::new());

    let result = timeout(Duration::from_secs(3), connection.run(|_| {}))
        .await
        .expect("run should give up");
    assert!(result.is_err());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}
