//! On-chain whale trade feed.
//!
//! Maintains a websocket connection to the trade event service, broadcasts
//! qualifying buys for alert rendering, and keeps a running buy-volume
//! total that backs the `whale` metric source. The connection reconnects
//! with exponential backoff; a challenge only sees readings while the feed
//! has connected at least once.

use crate::config::WhaleConfig;
use crate::error::FetchError;
use crate::source::{MetricSnapshot, MetricSource};
use chrono::{DateTime, Utc};
use futures_util::StreamExt as _;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const RECONNECT_BASE: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A qualifying buy observed on the feed.
#[derive(Debug, Clone)]
pub struct WhaleTrade {
    pub amount_usd: f64,
    pub price_usd: f64,
    pub amount_tokens: f64,
    pub tx_hash: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub volume_24h: f64,
    pub market_cap: f64,
}

// --- Wire types for the whale event service ---

#[derive(Deserialize)]
struct WireEnvelope {
    event_type: String,
    #[serde(default)]
    data: Option<WireAlert>,
}

#[derive(Deserialize)]
struct WireAlert {
    transaction: WireTransaction,
    alert: WireMeta,
    #[serde(default)]
    token_stats: serde_json::Value,
}

#[derive(Deserialize)]
struct WireTransaction {
    amount_usd: f64,
    price_usd: f64,
    amount_tokens: f64,
    transaction_hash: String,
}

#[derive(Deserialize)]
struct WireMeta {
    title: String,
    timestamp: String,
}

/// Shared feed state: whether the feed ever connected plus cumulative
/// buy volume in USD.
struct FeedState {
    ever_connected: AtomicBool,
    total_buy_volume: Mutex<f64>,
}

pub struct WhaleFeed {
    config: WhaleConfig,
    state: Arc<FeedState>,
    event_tx: broadcast::Sender<WhaleTrade>,
}

impl WhaleFeed {
    pub fn new(config: WhaleConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            state: Arc::new(FeedState {
                ever_connected: AtomicBool::new(false),
                total_buy_volume: Mutex::new(0.0),
            }),
            event_tx,
        }
    }

    /// Spawn the connection loop. The task runs until aborted.
    pub fn start(&self) -> JoinHandle<()> {
        let url = self.config.ws_url.clone();
        let threshold = self.config.min_threshold_usd;
        let state = Arc::clone(&self.state);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            run_feed_connection(url, threshold, state, event_tx).await;
        })
    }

    /// Subscribe to qualifying trades for alert forwarding.
    pub fn subscribe(&self) -> broadcast::Receiver<WhaleTrade> {
        self.event_tx.subscribe()
    }

    /// A fresh challenge-scoped metric source. The first successful fetch
    /// snapshots a baseline so a challenge measures volume accumulated
    /// during its own lifetime.
    pub fn source(&self) -> WhaleVolumeSource {
        WhaleVolumeSource {
            state: Arc::clone(&self.state),
            baseline: Mutex::new(None),
        }
    }
}

async fn run_feed_connection(
    url: String,
    threshold_usd: f64,
    state: Arc<FeedState>,
    event_tx: broadcast::Sender<WhaleTrade>,
) {
    let mut backoff = RECONNECT_BASE;

    loop {
        tracing::info!(%url, "connecting to whale feed");
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                state.ever_connected.store(true, Ordering::SeqCst);
                backoff = RECONNECT_BASE;
                tracing::info!("whale feed connected");

                let (_, mut read) = stream.split();
                while let Some(message) = read.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            handle_message(&text, threshold_usd, &state, &event_tx);
                        }
                        Ok(Message::Close(_)) => {
                            tracing::warn!("whale feed closed by server");
                            break;
                        }
                        Ok(_) => {}
                        Err(error) => {
                            tracing::warn!(%error, "whale feed read error");
                            break;
                        }
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%error, "whale feed connect failed");
            }
        }

        tracing::info!(delay_secs = backoff.as_secs(), "whale feed reconnecting");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_RECONNECT_DELAY);
    }
}

fn handle_message(
    text: &str,
    threshold_usd: f64,
    state: &FeedState,
    event_tx: &broadcast::Sender<WhaleTrade>,
) {
    let envelope: WireEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::debug!(%error, "unparseable whale feed message");
            return;
        }
    };

    if envelope.event_type != "new_whale" {
        tracing::debug!(event_type = %envelope.event_type, "ignoring feed event");
        return;
    }
    let Some(alert) = envelope.data else {
        return;
    };

    // Every buy counts toward the volume metric; the alert threshold only
    // gates notifications.
    {
        let mut total = state
            .total_buy_volume
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *total += alert.transaction.amount_usd;
    }

    if alert.transaction.amount_usd < threshold_usd {
        tracing::debug!(
            amount_usd = alert.transaction.amount_usd,
            "trade below alert threshold"
        );
        return;
    }

    let trade = WhaleTrade {
        amount_usd: alert.transaction.amount_usd,
        price_usd: alert.transaction.price_usd,
        amount_tokens: alert.transaction.amount_tokens,
        tx_hash: alert.transaction.transaction_hash,
        title: alert.alert.title,
        timestamp: alert
            .alert
            .timestamp
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        volume_24h: stat_field(&alert.token_stats, "volume_24h"),
        market_cap: stat_field(&alert.token_stats, "market_cap"),
    };

    // Send fails only when nobody is subscribed, which is fine.
    let _ = event_tx.send(trade);
}

// Stats arrive as numbers or numeric strings depending on the service
// version; both read as a float, anything else as zero.
fn stat_field(stats: &serde_json::Value, field: &str) -> f64 {
    match stats.get(field) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Alert text for a qualifying trade, rendered once here so every sink
/// shows the same thing.
pub fn render_alert(trade: &WhaleTrade) -> String {
    format!(
        "{}\n\
         💰 Buy Size: ${:.2}\n\
         🎯 Buy Price: ${:.8}\n\
         📊 Amount: {:.2} tokens\n\
         📈 24h Volume: ${:.2}\n\
         💎 Market Cap: ${:.2}\n\
         🔍 https://solscan.io/tx/{}",
        trade.title,
        trade.amount_usd,
        trade.price_usd,
        trade.amount_tokens,
        trade.volume_24h,
        trade.market_cap,
        trade.tx_hash,
    )
}

/// Challenge-scoped view of the feed's cumulative buy volume.
pub struct WhaleVolumeSource {
    state: Arc<FeedState>,
    baseline: Mutex<Option<f64>>,
}

impl MetricSource for WhaleVolumeSource {
    fn name(&self) -> &'static str {
        "whale"
    }

    async fn fetch(&self, _subject: &str) -> Result<MetricSnapshot, FetchError> {
        if !self.state.ever_connected.load(Ordering::SeqCst) {
            return Err(FetchError::Disconnected);
        }

        let total = *self
            .state
            .total_buy_volume
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut baseline = self
            .baseline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let base = *baseline.get_or_insert(total);

        Ok(MetricSnapshot::from([("volume".to_owned(), total - base)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_state() -> Arc<FeedState> {
        Arc::new(FeedState {
            ever_connected: AtomicBool::new(true),
            total_buy_volume: Mutex::new(0.0),
        })
    }

    fn whale_message(amount_usd: f64) -> String {
        serde_json::json!({
            "event_type": "new_whale",
            "data": {
                "transaction": {
                    "amount_usd": amount_usd,
                    "price_usd": 0.0042,
                    "amount_tokens": 1_000_000.0,
                    "transaction_hash": "abc123",
                },
                "alert": {
                    "title": "🐋 Whale Buy!",
                    "timestamp": "2026-08-29T12:00:00Z",
                },
                "token_stats": {
                    "volume_24h": "123456.78",
                    "market_cap": 9_900_000,
                },
            },
        })
        .to_string()
    }

    #[test]
    fn qualifying_trades_broadcast_and_accumulate() {
        let state = feed_state();
        let (event_tx, mut event_rx) = broadcast::channel(8);

        handle_message(&whale_message(12_000.0), 5_000.0, &state, &event_tx);

        let trade = event_rx.try_recv().expect("trade should broadcast");
        assert_eq!(trade.amount_usd, 12_000.0);
        assert_eq!(trade.volume_24h, 123_456.78);
        assert_eq!(trade.market_cap, 9_900_000.0);
        assert_eq!(*state.total_buy_volume.lock().unwrap(), 12_000.0);
    }

    #[test]
    fn sub_threshold_trades_count_toward_volume_but_do_not_alert() {
        let state = feed_state();
        let (event_tx, mut event_rx) = broadcast::channel(8);

        handle_message(&whale_message(900.0), 5_000.0, &state, &event_tx);

        assert!(event_rx.try_recv().is_err());
        assert_eq!(*state.total_buy_volume.lock().unwrap(), 900.0);
    }

    #[test]
    fn other_events_and_garbage_are_ignored() {
        let state = feed_state();
        let (event_tx, _event_rx) = broadcast::channel(8);

        handle_message(r#"{"event_type":"heartbeat"}"#, 5_000.0, &state, &event_tx);
        handle_message("not json", 5_000.0, &state, &event_tx);

        assert_eq!(*state.total_buy_volume.lock().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn volume_source_measures_from_its_baseline() {
        let state = feed_state();
        *state.total_buy_volume.lock().unwrap() = 40_000.0;

        let source = WhaleVolumeSource {
            state: Arc::clone(&state),
            baseline: Mutex::new(None),
        };

        let first = source.fetch("").await.unwrap();
        assert_eq!(first["volume"], 0.0);

        *state.total_buy_volume.lock().unwrap() = 55_000.0;
        let second = source.fetch("").await.unwrap();
        assert_eq!(second["volume"], 15_000.0);
    }

    #[tokio::test]
    async fn volume_source_errors_before_first_connect() {
        let state = Arc::new(FeedState {
            ever_connected: AtomicBool::new(false),
            total_buy_volume: Mutex::new(0.0),
        });
        let source = WhaleVolumeSource {
            state,
            baseline: Mutex::new(None),
        };
        assert!(matches!(
            source.fetch("").await,
            Err(FetchError::Disconnected)
        ));
    }
}
