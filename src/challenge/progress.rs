//! Progress snapshots handed to channel sinks for rendering.

use crate::challenge::Challenge;
use chrono::{DateTime, Utc};

/// Width of the rendered progress bar in glyphs.
const BAR_WIDTH: usize = 20;

/// How a finished challenge ended. Drives the banner a sink renders under
/// the final progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Completed,
    TimedOut { minutes: u64 },
    Cancelled,
}

/// Everything a sink needs to render one progress display.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub subject: String,
    pub rows: Vec<MetricProgress>,
    pub outcome: Option<ChallengeOutcome>,
    pub updated_at: DateTime<Utc>,
}

/// One metric line of a progress display.
#[derive(Debug, Clone)]
pub struct MetricProgress {
    pub metric: String,
    pub current: f64,
    pub target: f64,
    /// Rounded to one decimal, may exceed 100.
    pub percentage: f64,
    /// `[====----------------]` style, clamped at full.
    pub bar: String,
}

impl DisplayState {
    pub fn for_challenge(challenge: &Challenge, outcome: Option<ChallengeOutcome>) -> Self {
        let rows = challenge
            .targets
            .iter()
            .map(|(metric, target)| {
                let current = challenge.last_observed.get(metric).copied().unwrap_or(0.0);
                MetricProgress {
                    metric: metric.clone(),
                    current,
                    target: *target,
                    percentage: percentage(current, *target),
                    bar: progress_bar(current, *target),
                }
            })
            .collect();

        Self {
            subject: challenge.subject.clone(),
            rows,
            outcome,
            updated_at: Utc::now(),
        }
    }
}

/// Progress percentage to one decimal. A non-positive target renders as 0%
/// for display; target validation keeps such values out of real challenges.
pub fn percentage(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    (current / target * 1000.0).round() / 10.0
}

/// Fixed-width filled/empty bar, clamped at 100%.
pub fn progress_bar(current: f64, target: f64) -> String {
    let ratio = if target > 0.0 {
        (current / target).min(1.0)
    } else {
        0.0
    };
    let filled = (BAR_WIDTH as f64 * ratio) as usize;
    format!("[{}{}]", "=".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(percentage(90.0, 85.0), 105.9);
        assert_eq!(percentage(70.0, 85.0), 82.4);
        assert_eq!(percentage(0.0, 100.0), 0.0);
        assert_eq!(percentage(5.0, 0.0), 0.0);
    }

    #[test]
    fn bar_clamps_at_full() {
        assert_eq!(progress_bar(200.0, 100.0), format!("[{}]", "=".repeat(20)));
        assert_eq!(progress_bar(0.0, 100.0), format!("[{}]", "-".repeat(20)));
        assert_eq!(
            progress_bar(50.0, 100.0),
            format!("[{}{}]", "=".repeat(10), "-".repeat(10))
        );
    }
}
