//! GMGN.ai pool sentiment percentage.
//!
//! GMGN embeds the community vote split in the page's bootstrap JSON; when
//! that is absent the percentage next to the vote widget is used instead.

use crate::error::FetchError;
use crate::source::{FETCH_TIMEOUT, MetricSnapshot, MetricSource, headers};
use regex::Regex;
use std::sync::LazyLock;

static VOTE_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""vote_like_pct"\s*:\s*([0-9]+(?:\.[0-9]+)?)"#).expect("json pattern is valid")
});

static VOTE_WIDGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"vote[^<]*?([0-9]+(?:\.[0-9]+)?)%"#).expect("widget pattern is valid")
});

pub struct GmgnSource {
    client: reqwest::Client,
    pool_url: String,
}

impl GmgnSource {
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

impl MetricSource for GmgnSource {
    fn name(&self) -> &'static str {
        "gmgn"
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
            .ok_or_else(|| FetchError::Malformed("no vote split in page".to_owned()))?;

        tracing::debug!(sentiment = value, "gmgn reading");
        Ok(MetricSnapshot::from([("sentiment".to_owned(), value)]))
    }
}

fn extract_sentiment(body: &str) -> Option<f64> {
    if let Some(captures) = VOTE_JSON.captures(body) {
        return captures[1].parse().ok();
    }
    VOTE_WIDGET
        .captures(body)
        .and_then(|c| c[1].parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parses_from_bootstrap_json() {
        let body = r#"<script>{"pair":{"vote_like_pct":88.5,"vote_unlike_pct":11.5}}</script>"#;
        assert_eq!(extract_sentiment(body), Some(88.5));
    }

    #[test]
    fn sentiment_falls_back_to_widget_text() {
        let body = r#"<div class="vote-split">92%<img src="/static/vote/vote2.png"></div>"#;
        assert_eq!(extract_sentiment(body), Some(92.0));
    }

    #[test]
    fn missing_split_yields_none() {
        assert_eq!(extract_sentiment("<html>captcha</html>"), None);
    }
}
