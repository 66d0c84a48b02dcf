//! Channel sinks.
//!
//! A [`ChannelSink`] owns the platform side of a challenge: locking the
//! channel, rendering progress, cleaning up notices. The engine never
//! speaks a chat protocol directly. Text rendering that should look the
//! same on every platform lives here; markup is the adapter's business.

pub mod discord;
pub mod telegram;

use crate::ChannelId;
use crate::challenge::history::{RecordOutcome, Summary, humanize_age};
use crate::challenge::progress::{ChallengeOutcome, DisplayState};
use crate::error::SinkError;
use chrono::Utc;

/// Opaque reference to a rendered message, usable for later edits/deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle(pub String);

/// Pluggable lock/unlock and progress-display operations on one platform.
pub trait ChannelSink: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Prevent ordinary users from writing to the channel.
    fn lock(&self, channel: &ChannelId) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Reverse [`lock`](Self::lock). Must be safe to call when the channel
    /// was never locked.
    fn unlock(&self, channel: &ChannelId) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Post a transient notice (lock banner, whale alert, error text).
    fn notify(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> impl Future<Output = Result<MessageHandle, SinkError>> + Send;

    /// Create or update the rendered progress display.
    fn publish_progress(
        &self,
        channel: &ChannelId,
        state: &DisplayState,
        existing: Option<&MessageHandle>,
    ) -> impl Future<Output = Result<MessageHandle, SinkError>> + Send;

    /// Create or update the rolling performance summary display.
    fn publish_summary(
        &self,
        channel: &ChannelId,
        summary: &Summary,
        existing: Option<&MessageHandle>,
    ) -> impl Future<Output = Result<MessageHandle, SinkError>> + Send;

    /// Create or update a free-form pinned-style display (the live
    /// metrics dashboard uses this).
    fn publish_text(
        &self,
        channel: &ChannelId,
        text: &str,
        existing: Option<&MessageHandle>,
    ) -> impl Future<Output = Result<MessageHandle, SinkError>> + Send;

    /// Best-effort message deletion; deleting an already-gone message is
    /// not an error.
    fn delete_if_present(
        &self,
        channel: &ChannelId,
        handle: &MessageHandle,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Notice shown when a challenge locks its channel.
pub const LOCK_NOTICE: &str =
    "🚨 CHANNEL LOCKED 🚨\n🔒 This channel is locked until all engagement targets are met! 🔒\n\
     Channel will automatically unlock when targets are reached";

/// Platform-neutral progress text. Adapters may wrap it in richer markup.
pub fn render_progress_text(state: &DisplayState) -> String {
    let mut out = String::from("🎯 Community Engagement Challenge 🎯\n");

    for row in &state.rows {
        let status = if row.percentage >= 100.0 {
            "✅"
        } else if row.percentage >= 75.0 {
            "🔸"
        } else if row.percentage >= 50.0 {
            "🔹"
        } else {
            "⭕"
        };
        out.push_str(&format!(
            "\n{status} {}: {} {:.1}%\n   Current: {} / Target: {}\n",
            title_case(&row.metric),
            row.bar,
            row.percentage,
            format_value(row.current),
            format_value(row.target),
        ));
    }

    out.push_str(&format!("\n📝 {}\n", state.subject));

    match state.outcome {
        Some(ChallengeOutcome::Completed) => {
            out.push_str("\n🎉 CHALLENGE COMPLETE! 🎉\nAll targets reached! Channel unlocked! 🔓\n");
        }
        Some(ChallengeOutcome::TimedOut { minutes }) => {
            out.push_str(&format!(
                "\n⏰ RAID TIMED OUT! ⏰\nRaid ended after {minutes} minutes! Channel unlocked! 🔓\n"
            ));
        }
        Some(ChallengeOutcome::Cancelled) => {
            out.push_str("\n🛑 Challenge ended manually. Channel unlocked! 🔓\n");
        }
        None => {}
    }

    out
}

/// The 24h performance summary, one row per recent raid.
pub fn render_summary_text(summary: &Summary) -> String {
    let mut out = String::from("📊 RAID PERFORMANCE SUMMARY (24h)\n");
    out.push_str(&format!(
        "Total Raids: {} | Successful: {} | Timeouts: {}\n",
        summary.total, summary.successful, summary.timed_out
    ));

    if summary.recent.is_empty() {
        return out;
    }

    out.push_str("\nRECENT RAIDS:\n");
    let now = Utc::now();
    for record in &summary.recent {
        let status = match record.outcome {
            RecordOutcome::Success => "✅ SUCCESS".to_owned(),
            RecordOutcome::Timeout => {
                let best = record
                    .progress
                    .values()
                    .cloned()
                    .fold(f64::NEG_INFINITY, f64::max);
                if best.is_finite() {
                    format!("❌ TIMEOUT ({best:.0}%)")
                } else {
                    "❌ TIMEOUT".to_owned()
                }
            }
        };
        out.push_str(&format!(
            "🔗 {}\n{} • {:.0}m • {}\n\n",
            truncate_subject(&record.subject),
            status,
            record.duration_minutes,
            humanize_age(record.timestamp, now),
        ));
    }

    if summary.recent.len() < summary.total {
        out.push_str(&format!(
            "...and {} more raids in the last 24h\n",
            summary.total - summary.recent.len()
        ));
    }

    out
}

fn truncate_subject(subject: &str) -> String {
    const MAX: usize = 60;
    if subject.chars().count() > MAX {
        let head: String = subject.chars().take(MAX - 3).collect();
        format!("{head}...")
    } else {
        subject.to_owned()
    }
}

fn title_case(metric: &str) -> String {
    let mut chars = metric.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// Counted metrics read better without a trailing ".0"; percentages keep
// one decimal.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::history::HistoryRecord;
    use crate::challenge::progress::MetricProgress;
    use chrono::TimeDelta;
    use std::collections::BTreeMap;

    fn display_state(outcome: Option<ChallengeOutcome>) -> DisplayState {
        DisplayState {
            subject: "https://twitter.com/u/status/1".to_owned(),
            rows: vec![MetricProgress {
                metric: "likes".to_owned(),
                current: 84.0,
                target: 100.0,
                percentage: 84.0,
                bar: "[================----]".to_owned(),
            }],
            outcome,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn progress_text_shows_current_and_target() {
        let text = render_progress_text(&display_state(None));
        assert!(text.contains("Likes"));
        assert!(text.contains("Current: 84 / Target: 100"));
        assert!(text.contains("84.0%"));
        assert!(!text.contains("COMPLETE"));
    }

    #[test]
    fn terminal_banners_match_outcome() {
        let done = render_progress_text(&display_state(Some(ChallengeOutcome::Completed)));
        assert!(done.contains("CHALLENGE COMPLETE"));

        let timed = render_progress_text(&display_state(Some(ChallengeOutcome::TimedOut {
            minutes: 15,
        })));
        assert!(timed.contains("TIMED OUT"));
        assert!(timed.contains("after 15 minutes"));
    }

    #[test]
    fn summary_lists_recent_raids_with_best_progress_on_timeouts() {
        let summary = Summary {
            total: 12,
            successful: 7,
            timed_out: 5,
            recent: vec![HistoryRecord {
                subject: "https://twitter.com/u/status/1".to_owned(),
                outcome: RecordOutcome::Timeout,
                timestamp: Utc::now() - TimeDelta::minutes(30),
                duration_minutes: 15.0,
                progress: BTreeMap::from([
                    ("likes".to_owned(), 61.0),
                    ("retweets".to_owned(), 88.0),
                ]),
            }],
        };

        let text = render_summary_text(&summary);
        assert!(text.contains("Total Raids: 12 | Successful: 7 | Timeouts: 5"));
        assert!(text.contains("❌ TIMEOUT (88%)"));
        assert!(text.contains("30 minutes ago"));
        assert!(text.contains("...and 11 more raids"));
    }

    #[test]
    fn long_subjects_are_truncated() {
        let long = format!("https://twitter.com/{}/status/1", "a".repeat(80));
        let truncated = truncate_subject(&long);
        assert_eq!(truncated.chars().count(), 60);
        assert!(truncated.ends_with("..."));
    }
}
