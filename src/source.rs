//! Metric sources.
//!
//! Each external site the bot can raid against implements [`MetricSource`]:
//! given a subject reference it returns one numeric reading per metric.
//! Fetches must be cheap to retry and bounded in time; a failed fetch skips
//! one poll cycle and is never fatal for a running challenge.

pub mod coinmarketcap;
pub mod dextools;
pub mod geckoterminal;
pub mod gmgn;
pub mod headers;
pub mod twitter;
pub mod whale;

use crate::error::FetchError;
use std::collections::BTreeMap;
use std::time::Duration;

/// One observed reading, metric name to value.
pub type MetricSnapshot = BTreeMap<String, f64>;

/// Per-request timeout applied by every HTTP source.
pub(crate) const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A pluggable provider of current numeric readings for a subject.
pub trait MetricSource: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn fetch(
        &self,
        subject: &str,
    ) -> impl Future<Output = Result<MetricSnapshot, FetchError>> + Send;
}

/// Parse counts the way engagement sites abbreviate them: `984`, `1,203`,
/// `1.2K`, `3M`.
pub(crate) fn parse_compact_count(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }

    let upper = cleaned.to_ascii_uppercase();
    if let Some(stripped) = upper.strip_suffix('K') {
        return stripped.parse::<f64>().ok().map(|n| n * 1_000.0);
    }
    if let Some(stripped) = upper.strip_suffix('M') {
        return stripped.parse::<f64>().ok().map(|n| n * 1_000_000.0);
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_counts_parse() {
        assert_eq!(parse_compact_count("984"), Some(984.0));
        assert_eq!(parse_compact_count("1,203"), Some(1203.0));
        assert_eq!(parse_compact_count("1.2K"), Some(1200.0));
        assert_eq!(parse_compact_count("3M"), Some(3_000_000.0));
        assert_eq!(parse_compact_count("  2.5k "), Some(2500.0));
        assert_eq!(parse_compact_count(""), None);
        assert_eq!(parse_compact_count("n/a"), None);
    }
}
