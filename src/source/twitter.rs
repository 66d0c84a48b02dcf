//! Post engagement metrics for X/Twitter statuses.
//!
//! Reads the public syndication JSON for a status rather than driving a
//! browser. Counts may arrive as numbers or as abbreviated strings
//! ("1.2K"); both are normalized.

use crate::error::{FetchError, ValidationError};
use crate::source::{FETCH_TIMEOUT, MetricSnapshot, MetricSource, headers, parse_compact_count};
use regex::Regex;
use std::sync::LazyLock;

const SYNDICATION_URL: &str = "https://cdn.syndication.twimg.com/tweet-result";

static STATUS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:twitter\.com|x\.com)/\w+/status/(\d+)")
        .expect("status url pattern is valid")
});

/// Validate a status URL and normalize the host to twitter.com. Returns the
/// cleaned URL (query cruft stripped).
pub fn normalize_status_url(url: &str) -> Result<String, ValidationError> {
    let captures = STATUS_URL
        .captures(url)
        .ok_or_else(|| ValidationError::InvalidSubject(url.to_owned()))?;
    let matched = captures.get(0).expect("whole-match group always present");
    Ok(matched.as_str().replace("x.com", "twitter.com"))
}

fn status_id(url: &str) -> Result<&str, FetchError> {
    STATUS_URL
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| FetchError::Malformed(format!("not a status url: {url}")))
}

pub struct TwitterSource {
    client: reqwest::Client,
}

impl TwitterSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on bad TLS config");
        Self { client }
    }
}

impl Default for TwitterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for TwitterSource {
    fn name(&self) -> &'static str {
        "twitter"
    }

    async fn fetch(&self, subject: &str) -> Result<MetricSnapshot, FetchError> {
        let id = status_id(subject)?;

        let body: serde_json::Value = self
            .client
            .get(SYNDICATION_URL)
            .query(&[("id", id), ("lang", "en")])
            .headers(headers::random_headers())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(snapshot_from_json(&body))
    }
}

/// Pull the engagement counts out of a syndication payload. Absent fields
/// read as zero so a partially rendered payload still yields a snapshot.
fn snapshot_from_json(body: &serde_json::Value) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();
    for (metric, field) in [
        ("likes", "favorite_count"),
        ("retweets", "retweet_count"),
        ("replies", "reply_count"),
        ("bookmarks", "bookmark_count"),
    ] {
        snapshot.insert(metric.to_owned(), count_field(body, field));
    }
    snapshot
}

fn count_field(body: &serde_json::Value, field: &str) -> f64 {
    match body.get(field) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => parse_compact_count(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_urls_normalize_to_twitter_host() {
        let url = normalize_status_url("https://x.com/someone/status/1861234?s=20").unwrap();
        assert_eq!(url, "https://twitter.com/someone/status/1861234");

        let url = normalize_status_url("http://twitter.com/a_b/status/99").unwrap();
        assert_eq!(url, "http://twitter.com/a_b/status/99");
    }

    #[test]
    fn non_status_urls_are_rejected() {
        assert!(normalize_status_url("https://twitter.com/someone").is_err());
        assert!(normalize_status_url("https://example.com/x/status/1").is_err());
        assert!(normalize_status_url("not a url").is_err());
    }

    #[test]
    fn counts_parse_from_numbers_and_strings() {
        let body = serde_json::json!({
            "favorite_count": 1042,
            "retweet_count": "1.2K",
            "reply_count": "87",
        });
        let snapshot = snapshot_from_json(&body);
        assert_eq!(snapshot["likes"], 1042.0);
        assert_eq!(snapshot["retweets"], 1200.0);
        assert_eq!(snapshot["replies"], 87.0);
        assert_eq!(snapshot["bookmarks"], 0.0);
    }
}
