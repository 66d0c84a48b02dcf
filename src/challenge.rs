//! Engagement challenges.
//!
//! A [`Challenge`] is one run of "lock a channel until a metric target is
//! met or time runs out". The submodules hold the monitor engine, the
//! active-challenge registry, the rolling history ledger, and the progress
//! snapshot types that sinks render.

pub mod engine;
pub mod history;
pub mod progress;
pub mod registry;

use crate::source::MetricSnapshot;
use crate::{ChallengeId, ChannelId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Lower timeout bound, minutes.
pub const MIN_TIMEOUT_MINUTES: u64 = 1;
/// Upper timeout bound, minutes.
pub const MAX_TIMEOUT_MINUTES: u64 = 120;
/// Timeout applied when a start request names none.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 15;
/// Upper bound for any single target value.
pub const MAX_TARGET_VALUE: u64 = 1_000_000;

/// Challenge lifecycle state. `Active` is the only non-terminal state and
/// every terminal state is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Active,
    Completed,
    TimedOut,
    Cancelled,
}

/// One engagement challenge. `targets` is immutable after creation; only
/// `state` and `last_observed` change while the challenge runs.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: ChallengeId,
    pub channel_id: ChannelId,
    /// What is being raided: a post URL, a pool page, a feed identifier.
    pub subject: String,
    /// Conjunctive targets; single-metric sources use a one-entry map.
    pub targets: BTreeMap<String, f64>,
    pub timeout: Duration,
    pub started_at: DateTime<Utc>,
    pub state: ChallengeState,
    /// Most recent reading, untouched across failed fetches.
    pub last_observed: MetricSnapshot,
    pub last_published_at: Option<DateTime<Utc>>,
}

impl Challenge {
    pub fn new(
        channel_id: ChannelId,
        subject: impl Into<String>,
        targets: BTreeMap<String, f64>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            channel_id,
            subject: subject.into(),
            targets,
            timeout,
            started_at: Utc::now(),
            state: ChallengeState::Active,
            last_observed: MetricSnapshot::new(),
            last_published_at: None,
        }
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// True when every target metric has reached its goal in the last
    /// observed snapshot. A metric the source never reported counts as zero.
    pub fn targets_met(&self) -> bool {
        self.targets.iter().all(|(metric, target)| {
            self.last_observed.get(metric).copied().unwrap_or(0.0) >= *target
        })
    }

    /// Final per-metric progress percentages, possibly above 100.
    pub fn progress_percentages(&self) -> BTreeMap<String, f64> {
        self.targets
            .iter()
            .map(|(metric, target)| {
                let current = self.last_observed.get(metric).copied().unwrap_or(0.0);
                (metric.clone(), progress::percentage(current, *target))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge_with(targets: &[(&str, f64)], observed: &[(&str, f64)]) -> Challenge {
        let mut challenge = Challenge::new(
            ChannelId::from("chan"),
            "https://twitter.com/u/status/1",
            targets
                .iter()
                .map(|(m, v)| (m.to_string(), *v))
                .collect(),
            Duration::from_secs(900),
        );
        challenge.last_observed = observed
            .iter()
            .map(|(m, v)| (m.to_string(), *v))
            .collect();
        challenge
    }

    #[test]
    fn completion_is_conjunctive() {
        let met = challenge_with(
            &[("likes", 100.0), ("retweets", 50.0)],
            &[("likes", 150.0), ("retweets", 50.0)],
        );
        assert!(met.targets_met());

        let partial = challenge_with(
            &[("likes", 100.0), ("retweets", 50.0)],
            &[("likes", 150.0), ("retweets", 40.0)],
        );
        assert!(!partial.targets_met());
    }

    #[test]
    fn missing_metric_counts_as_zero() {
        let challenge = challenge_with(&[("likes", 100.0)], &[("retweets", 500.0)]);
        assert!(!challenge.targets_met());
    }

    #[test]
    fn percentages_can_exceed_one_hundred() {
        let challenge = challenge_with(&[("sentiment", 85.0)], &[("sentiment", 90.0)]);
        let progress = challenge.progress_percentages();
        assert_eq!(progress["sentiment"], 105.9);
    }
}
