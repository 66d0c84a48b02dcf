//! Live sentiment dashboard.
//!
//! A background task that polls the always-on sources (CoinMarketCap
//! likes, GeckoTerminal and Dextools sentiment) every few minutes and
//! keeps one pinned-style message in the raid channel up to date,
//! marking each metric with a trend glyph and the change since the
//! previous refresh. The message is edited in place; if an edit fails
//! the handle is dropped and the next refresh posts a fresh message.

use crate::ChannelId;
use crate::sink::{ChannelSink, MessageHandle};
use crate::source::MetricSource;
use crate::source::coinmarketcap::CoinMarketCapSource;
use crate::source::dextools::DextoolsSource;
use crate::source::geckoterminal::GeckoTerminalSource;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// One dashboard line: a labelled metric with its latest value and the
/// value from the previous refresh, if any.
#[derive(Debug, Clone)]
pub struct Reading {
    pub label: &'static str,
    /// Appended to rendered values ("%" for sentiment, "" for counts).
    pub suffix: &'static str,
    pub value: Option<f64>,
    pub previous: Option<f64>,
}

pub struct Dashboard<K: ChannelSink> {
    channel: ChannelId,
    sink: Arc<K>,
    coinmarketcap: Arc<CoinMarketCapSource>,
    dextools: Arc<DextoolsSource>,
    geckoterminal: Arc<GeckoTerminalSource>,
    handle: Option<MessageHandle>,
    previous: BTreeMap<&'static str, f64>,
}

impl<K: ChannelSink> Dashboard<K> {
    pub fn new(
        channel: ChannelId,
        sink: Arc<K>,
        coinmarketcap: Arc<CoinMarketCapSource>,
        dextools: Arc<DextoolsSource>,
        geckoterminal: Arc<GeckoTerminalSource>,
    ) -> Self {
        Self {
            channel,
            sink,
            coinmarketcap,
            dextools,
            geckoterminal,
            handle: None,
            previous: BTreeMap::new(),
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }

    async fn refresh(&mut self) {
        let readings = self.collect().await;
        let text = render_dashboard(&readings, Utc::now());

        match self
            .sink
            .publish_text(&self.channel, &text, self.handle.as_ref())
            .await
        {
            Ok(handle) => {
                self.handle = Some(handle);
                for reading in &readings {
                    if let Some(value) = reading.value {
                        self.previous.insert(reading.label, value);
                    }
                }
            }
            Err(error) => {
                // The pinned message may have been deleted out from
                // under us; start over with a fresh one next time.
                tracing::warn!(%error, channel = %self.channel, "dashboard update failed");
                self.handle = None;
            }
        }
    }

    async fn collect(&self) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(3);
        readings.push(self.read(CMC_LABEL, "", &*self.coinmarketcap, "likes").await);
        readings.push(
            self.read(GECKO_LABEL, "%", &*self.geckoterminal, "sentiment")
                .await,
        );
        readings.push(
            self.read(DEXTOOLS_LABEL, "%", &*self.dextools, "sentiment")
                .await,
        );
        readings
    }

    async fn read<S: MetricSource>(
        &self,
        label: &'static str,
        suffix: &'static str,
        source: &S,
        metric: &str,
    ) -> Reading {
        let value = match source.fetch("").await {
            Ok(snapshot) => snapshot.get(metric).copied(),
            Err(error) => {
                tracing::warn!(%error, source = source.name(), "dashboard fetch failed");
                None
            }
        };
        Reading {
            label,
            suffix,
            value,
            previous: self.previous.get(label).copied(),
        }
    }
}

const CMC_LABEL: &str = "CMC Likes";
const GECKO_LABEL: &str = "Gecko Sentiment";
const DEXTOOLS_LABEL: &str = "Dextools Sentiment";

fn trend(current: f64, previous: Option<f64>) -> &'static str {
    match previous {
        Some(p) if current > p => "↗️",
        Some(p) if current < p => "↘️",
        _ => "➖",
    }
}

fn format_reading(value: f64, suffix: &str) -> String {
    if suffix.is_empty() && value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}{suffix}")
    }
}

/// Dashboard text: one line per metric with a trend glyph, then the
/// deltas since the previous refresh for every metric that has one.
pub fn render_dashboard(readings: &[Reading], now: chrono::DateTime<Utc>) -> String {
    let mut out = String::from("📊 LIVE SENTIMENT METRICS 📊\n");

    for reading in readings {
        match reading.value {
            Some(value) => {
                out.push_str(&format!(
                    "\n{} {}: {}\n",
                    trend(value, reading.previous),
                    reading.label,
                    format_reading(value, reading.suffix),
                ));
            }
            None => {
                out.push_str(&format!("\n➖ {}: unavailable\n", reading.label));
            }
        }
    }

    let deltas: Vec<String> = readings
        .iter()
        .filter_map(|reading| {
            let (value, previous) = (reading.value?, reading.previous?);
            let delta = value - previous;
            Some(format!(
                "  {}: {}{}{}",
                reading.label,
                if delta >= 0.0 { "+" } else { "" },
                format_reading(delta, ""),
                reading.suffix,
            ))
        })
        .collect();

    if !deltas.is_empty() {
        out.push_str("\nChanges (5m):\n");
        for line in &deltas {
            out.push_str(line);
            out.push('\n');
        }
    }

    out.push_str(&format!("\nUpdated: {} UTC\n", now.format("%H:%M:%S")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(label: &'static str, suffix: &'static str, value: f64, previous: Option<f64>) -> Reading {
        Reading {
            label,
            suffix,
            value: Some(value),
            previous,
        }
    }

    #[test]
    fn trend_tracks_direction() {
        assert_eq!(trend(10.0, Some(5.0)), "↗️");
        assert_eq!(trend(5.0, Some(10.0)), "↘️");
        assert_eq!(trend(5.0, Some(5.0)), "➖");
        assert_eq!(trend(5.0, None), "➖");
    }

    #[test]
    fn first_refresh_has_no_delta_block() {
        let readings = vec![
            reading(CMC_LABEL, "", 1200.0, None),
            reading(GECKO_LABEL, "%", 85.0, None),
        ];
        let text = render_dashboard(&readings, Utc::now());
        assert!(text.contains("➖ CMC Likes: 1200"));
        assert!(text.contains("➖ Gecko Sentiment: 85.0%"));
        assert!(!text.contains("Changes (5m)"));
    }

    #[test]
    fn later_refreshes_show_signed_deltas() {
        let readings = vec![
            reading(CMC_LABEL, "", 1212.0, Some(1200.0)),
            reading(DEXTOOLS_LABEL, "%", 70.5, Some(72.0)),
        ];
        let text = render_dashboard(&readings, Utc::now());
        assert!(text.contains("↗️ CMC Likes: 1212"));
        assert!(text.contains("↘️ Dextools Sentiment: 70.5%"));
        assert!(text.contains("Changes (5m):"));
        assert!(text.contains("CMC Likes: +12"));
        assert!(text.contains("Dextools Sentiment: -1.5%"));
    }

    #[test]
    fn failed_fetch_renders_as_unavailable() {
        let readings = vec![Reading {
            label: GECKO_LABEL,
            suffix: "%",
            value: None,
            previous: Some(80.0),
        }];
        let text = render_dashboard(&readings, Utc::now());
        assert!(text.contains("➖ Gecko Sentiment: unavailable"));
        assert!(!text.contains("Changes (5m)"));
    }
}
