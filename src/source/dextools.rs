//! Dextools community sentiment percentage.
//!
//! Served by the same sentiment aggregation API as the CMC gauge; the body
//! is a bare percentage.

use crate::config::SourcesConfig;
use crate::error::FetchError;
use crate::source::{FETCH_TIMEOUT, MetricSnapshot, MetricSource};

pub struct DextoolsSource {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl DextoolsSource {
    pub fn new(sources: &SourcesConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on bad TLS config");
        Self {
            client,
            endpoint: format!("{}/api/v1/sentiment/dextools", sources.sentiment_api_url),
            token: sources.sentiment_api_token.clone(),
        }
    }
}

impl MetricSource for DextoolsSource {
    fn name(&self) -> &'static str {
        "dextools"
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

        tracing::debug!(sentiment = value, "dextools reading");
        Ok(MetricSnapshot::from([("sentiment".to_owned(), value)]))
    }
}
