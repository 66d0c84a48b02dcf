//! Raid command argument parsing.
//!
//! Every platform command shares one grammar: whitespace-separated
//! `metric:value` pairs. Malformed pairs, unknown metrics, and
//! out-of-range values are skipped rather than rejected, so a typo in
//! one pair never kills the whole command; only an empty result is an
//! error. `timeout:` is clamped into range instead of skipped.

use crate::challenge::{
    DEFAULT_TIMEOUT_MINUTES, MAX_TARGET_VALUE, MAX_TIMEOUT_MINUTES, MIN_TIMEOUT_MINUTES,
};
use crate::error::ValidationError;
use std::collections::BTreeMap;
use std::time::Duration;

/// A metric name a command surface accepts, with its value ceiling.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub max: u64,
}

const fn spec(name: &'static str, max: u64) -> MetricSpec {
    MetricSpec { name, max }
}

/// Post-engagement raids: any mix of the four counters.
pub const TWITTER_METRICS: &[MetricSpec] = &[
    spec("likes", MAX_TARGET_VALUE),
    spec("retweets", MAX_TARGET_VALUE),
    spec("replies", MAX_TARGET_VALUE),
    spec("bookmarks", MAX_TARGET_VALUE),
];

/// Upvote raids: a single absolute count.
pub const UPVOTE_METRICS: &[MetricSpec] = &[spec("likes", MAX_TARGET_VALUE)];

/// Sentiment raids: a buy-percentage, so 100 is the ceiling.
pub const SENTIMENT_METRICS: &[MetricSpec] = &[spec("sentiment", 100)];

/// Whale-volume raids: USD buy volume above the challenge baseline.
pub const VOLUME_METRICS: &[MetricSpec] = &[spec("volume", MAX_TARGET_VALUE)];

/// A parsed, validated request ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub subject: String,
    pub targets: BTreeMap<String, f64>,
    pub timeout: Duration,
}

/// Parse `metric:value` pairs against the allowed metric set. Values are
/// whole numbers; anything unparseable or out of range is dropped.
pub fn parse_start(
    subject: impl Into<String>,
    args: &str,
    allowed: &[MetricSpec],
) -> Result<StartRequest, ValidationError> {
    let mut targets = BTreeMap::new();
    let mut timeout_minutes = DEFAULT_TIMEOUT_MINUTES;

    for pair in args.split_whitespace() {
        let Some((metric, value)) = pair.split_once(':') else {
            continue;
        };
        let metric = metric.to_ascii_lowercase();

        if metric == "timeout" {
            if let Ok(minutes) = value.parse::<i64>() {
                timeout_minutes =
                    minutes.clamp(MIN_TIMEOUT_MINUTES as i64, MAX_TIMEOUT_MINUTES as i64) as u64;
            }
            continue;
        }

        let Some(spec) = allowed.iter().find(|s| s.name == metric) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        if value > 0 && value <= spec.max {
            targets.insert(metric, value as f64);
        }
    }

    if targets.is_empty() {
        return Err(ValidationError::EmptyTargets);
    }

    Ok(StartRequest {
        subject: subject.into(),
        targets,
        timeout: Duration::from_secs(timeout_minutes * 60),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_targets_and_timeout() {
        let request = parse_start(
            "https://twitter.com/u/status/1",
            "likes:100 retweets:50 timeout:30",
            TWITTER_METRICS,
        )
        .expect("request should parse");

        assert_eq!(request.targets["likes"], 100.0);
        assert_eq!(request.targets["retweets"], 50.0);
        assert_eq!(request.timeout, Duration::from_secs(30 * 60));
    }

    #[test]
    fn default_timeout_is_fifteen_minutes() {
        let request = parse_start("url", "likes:100", TWITTER_METRICS).unwrap();
        assert_eq!(request.timeout, Duration::from_secs(15 * 60));
    }

    #[test]
    fn timeout_is_clamped_not_skipped() {
        let request = parse_start("url", "likes:100 timeout:500", TWITTER_METRICS).unwrap();
        assert_eq!(request.timeout, Duration::from_secs(120 * 60));

        let request = parse_start("url", "likes:100 timeout:0", TWITTER_METRICS).unwrap();
        assert_eq!(request.timeout, Duration::from_secs(60));
    }

    #[test]
    fn malformed_and_unknown_pairs_are_skipped() {
        let request = parse_start(
            "url",
            "likes:100 views:9000 retweets:abc bare replies:50",
            TWITTER_METRICS,
        )
        .unwrap();

        assert_eq!(request.targets.len(), 2);
        assert!(request.targets.contains_key("likes"));
        assert!(request.targets.contains_key("replies"));
    }

    #[test]
    fn metric_names_are_case_insensitive() {
        let request = parse_start("url", "LIKES:100", TWITTER_METRICS).unwrap();
        assert_eq!(request.targets["likes"], 100.0);
    }

    #[test]
    fn out_of_range_values_are_dropped() {
        assert_eq!(
            parse_start("url", "likes:0 retweets:2000000", TWITTER_METRICS),
            Err(ValidationError::EmptyTargets)
        );
    }

    #[test]
    fn sentiment_is_capped_at_one_hundred() {
        assert!(parse_start("pool", "sentiment:85", SENTIMENT_METRICS).is_ok());
        assert_eq!(
            parse_start("pool", "sentiment:150", SENTIMENT_METRICS),
            Err(ValidationError::EmptyTargets)
        );
    }

    #[test]
    fn no_valid_targets_is_an_error() {
        assert_eq!(
            parse_start("url", "", TWITTER_METRICS),
            Err(ValidationError::EmptyTargets)
        );
        assert_eq!(
            parse_start("url", "timeout:30", TWITTER_METRICS),
            Err(ValidationError::EmptyTargets)
        );
    }
}
