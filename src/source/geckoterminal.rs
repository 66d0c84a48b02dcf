//! GeckoTerminal pool sentiment percentage.
//!
//! The sentiment gauge is rendered as a `bg-buy` bar whose label (or width
//! style, when the label is empty) carries the positive-vote percentage.
//! We fetch the page and extract it with patterns rather than a browser.

use crate::error::FetchError;
use crate::source::{FETCH_TIMEOUT, MetricSnapshot, MetricSource, headers};
use regex::Regex;
use std::sync::LazyLock;

static SENTIMENT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"bg-buy[^>]*>\s*([0-9]+(?:\.[0-9]+)?)%"#).expect("label pattern is valid")
});

// Fallback: the bar width mirrors the percentage when the label is empty.
static SENTIMENT_WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"bg-buy[^>]*width:\s*([0-9]+(?:\.[0-9]+)?)%"#).expect("width pattern is valid")
});

pub struct GeckoTerminalSource {
    client: reqwest::Client,
    pool_url: String,
}

impl GeckoTerminalSource {
    pub fn new(pool_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on bad TLS config");
        Self {
            client,
            pool_url: pool_url.into(),
        }
    }
}

impl MetricSource for GeckoTerminalSource {
    fn name(&self) -> &'static str {
        "geckoterminal"
    }

    async fn fetch(&self, subject: &str) -> Result<MetricSnapshot, FetchError> {
        let url = if subject.is_empty() { &self.pool_url } else { subject };
        let body = self
            .client
            .get(url)
            .headers(headers::random_headers())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let value = extract_sentiment(&body)
            .ok_or_else(|| FetchError::Malformed("no sentiment gauge in page".to_owned()))?;

        tracing::debug!(sentiment = value, "geckoterminal reading");
        Ok(MetricSnapshot::from([("sentiment".to_owned(), value)]))
    }
}

fn extract_sentiment(body: &str) -> Option<f64> {
    let from_label = SENTIMENT_LABEL
        .captures(body)
        .and_then(|c| c[1].parse::<f64>().ok());
    if from_label.is_some() {
        return from_label;
    }
    SENTIMENT_WIDTH
        .captures(body)
        .and_then(|c| c[1].parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parses_from_label() {
        let body = r#"<div class="h-2 bg-buy" style="width: 73.4%">73.4%</div>"#;
        assert_eq!(extract_sentiment(body), Some(73.4));
    }

    #[test]
    fn sentiment_falls_back_to_bar_width() {
        let body = r#"<div class="h-2 bg-buy" style="width: 61%"></div>"#;
        assert_eq!(extract_sentiment(body), Some(61.0));
    }

    #[test]
    fn missing_gauge_yields_none() {
        assert_eq!(extract_sentiment("<html><body>rate limited</body></html>"), None);
    }
}
