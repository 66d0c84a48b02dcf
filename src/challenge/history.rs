//! Rolling 24-hour history ledger for finished challenges.
//!
//! One global ledger per deployment, persisted as a JSON file that is
//! rewritten whole on every append. Eviction runs on load and on every
//! write so stale records never resurface after a restart.

use crate::error::PersistenceError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Records older than this are purged.
const RETENTION_HOURS: i64 = 24;
/// How many records a summary lists.
const SUMMARY_RECENT_LIMIT: usize = 10;

/// How a recorded challenge ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Success,
    Timeout,
}

/// Immutable snapshot written once per finished challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub subject: String,
    pub outcome: RecordOutcome,
    pub timestamp: DateTime<Utc>,
    pub duration_minutes: f64,
    /// Final per-metric percentage, possibly above 100.
    pub progress: BTreeMap<String, f64>,
}

/// Aggregate view over the retention window.
#[derive(Debug, Clone)]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub timed_out: usize,
    /// Most recent first.
    pub recent: Vec<HistoryRecord>,
}

pub struct HistoryStore {
    path: PathBuf,
    records: Mutex<Vec<HistoryRecord>>,
}

impl HistoryStore {
    /// Open the ledger, restoring and immediately evicting persisted
    /// records. A missing file is an empty ledger, not an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let mut records: Vec<HistoryRecord> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };
        evict(&mut records, Utc::now());

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Append a record, evict everything outside the retention window, and
    /// rewrite the file. Read-modify-write runs as one critical section.
    pub async fn append(&self, record: HistoryRecord) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().await;
        records.push(record);
        evict(&mut records, Utc::now());
        self.persist(&records)
    }

    /// Counts plus the most recent records, timestamp-descending.
    pub async fn summarize(&self) -> Summary {
        let mut records = self.records.lock().await;
        evict(&mut records, Utc::now());

        let total = records.len();
        let successful = records
            .iter()
            .filter(|r| r.outcome == RecordOutcome::Success)
            .count();

        let mut recent: Vec<HistoryRecord> = records.clone();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(SUMMARY_RECENT_LIMIT);

        Summary {
            total,
            successful,
            timed_out: total - successful,
            recent,
        }
    }

    fn persist(&self, records: &[HistoryRecord]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn evict(records: &mut Vec<HistoryRecord>, now: DateTime<Utc>) {
    let cutoff = now - TimeDelta::hours(RETENTION_HOURS);
    records.retain(|record| record.timestamp > cutoff);
}

/// Humanized age for summary rows ("42 minutes ago", "3 hours ago").
pub fn humanize_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - timestamp;
    let hours = elapsed.num_seconds() as f64 / 3600.0;
    if hours < 1.0 {
        format!("{:.0} minutes ago", elapsed.num_seconds() as f64 / 60.0)
    } else if hours < 24.0 {
        format!("{hours:.0} hours ago")
    } else {
        format!("{:.0} days ago", hours / 24.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(hours_ago: i64, outcome: RecordOutcome) -> HistoryRecord {
        HistoryRecord {
            subject: "https://twitter.com/u/status/1".to_owned(),
            outcome,
            timestamp: Utc::now() - TimeDelta::hours(hours_ago),
            duration_minutes: 12.0,
            progress: BTreeMap::from([("likes".to_owned(), 84.0)]),
        }
    }

    fn temp_store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = HistoryStore::load(dir.path().join("history.json"))
            .expect("store should open on a missing file");
        (dir, store)
    }

    #[tokio::test]
    async fn retention_window_is_twenty_four_hours() {
        let (_dir, store) = temp_store();
        store.append(record_at(25, RecordOutcome::Timeout)).await.unwrap();
        store.append(record_at(23, RecordOutcome::Success)).await.unwrap();

        let summary = store.summarize().await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.timed_out, 0);
        assert_eq!(summary.recent[0].outcome, RecordOutcome::Success);
    }

    #[tokio::test]
    async fn load_evicts_stale_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let records = vec![
            record_at(30, RecordOutcome::Success),
            record_at(2, RecordOutcome::Timeout),
        ];
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let store = HistoryStore::load(&path).expect("store should load");
        let summary = store.summarize().await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.recent[0].outcome, RecordOutcome::Timeout);
    }

    #[tokio::test]
    async fn append_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        {
            let store = HistoryStore::load(&path).unwrap();
            store.append(record_at(1, RecordOutcome::Success)).await.unwrap();
        }

        let reopened = HistoryStore::load(&path).unwrap();
        let summary = reopened.summarize().await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.recent[0].duration_minutes, 12.0);
    }

    #[tokio::test]
    async fn summary_orders_recent_first_and_caps_at_ten() {
        let (_dir, store) = temp_store();
        for hours in 1..=12 {
            store.append(record_at(hours, RecordOutcome::Success)).await.unwrap();
        }

        let summary = store.summarize().await;
        assert_eq!(summary.total, 12);
        assert_eq!(summary.recent.len(), 10);
        assert!(summary.recent[0].timestamp > summary.recent[9].timestamp);
    }

    #[test]
    fn humanized_ages() {
        let now = Utc::now();
        assert_eq!(humanize_age(now - TimeDelta::minutes(42), now), "42 minutes ago");
        assert_eq!(humanize_age(now - TimeDelta::hours(3), now), "3 hours ago");
        assert_eq!(humanize_age(now - TimeDelta::hours(49), now), "2 days ago");
    }
}
