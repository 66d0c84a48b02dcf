//! CoinMarketCap dexscan upvote count.
//!
//! Upvotes come through the sentiment aggregation API (which does the
//! actual site polling) as a bare numeric body.

use crate::config::SourcesConfig;
use crate::error::FetchError;
use crate::source::{FETCH_TIMEOUT, MetricSnapshot, MetricSource};

pub struct CoinMarketCapSource {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl CoinMarketCapSource {
    pub fn new(sources: &SourcesConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on bad TLS config");
        Self {
            client,
            endpoint: format!("{}/api/v1/sentiment/cmc", sources.sentiment_api_url),
            token: sources.sentiment_api_token.clone(),
        }
    }
}

impl MetricSource for CoinMarketCapSource {
    fn name(&self) -> &'static str {
        "coinmarketcap"
    }

    async fn fetch(&self, _subject: &str) -> Result<MetricSnapshot, FetchError> {
        let body = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let value: f64 = body
            .trim()
            .parse()
            .map_err(|_| FetchError::Malformed(format!("not a number: {body:?}")))?;

        tracing::debug!(upvotes = value, "cmc reading");
        Ok(MetricSnapshot::from([("likes".to_owned(), value)]))
    }
}
