//! The challenge monitor engine.
//!
//! One engine drives every challenge in the deployment. `start` validates,
//! registers, locks, and spawns one monitor task; the task owns the poll
//! loop and the terminal sequence. Fetch failures skip a cycle, sink
//! failures degrade to logs, and the unlock always comes first when a
//! challenge ends.

use crate::challenge::history::{HistoryRecord, HistoryStore, RecordOutcome};
use crate::challenge::progress::{ChallengeOutcome, DisplayState};
use crate::challenge::registry::ChallengeRegistry;
use crate::challenge::{
    Challenge, ChallengeState, MAX_TARGET_VALUE, MAX_TIMEOUT_MINUTES, MIN_TIMEOUT_MINUTES,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Error, ValidationError};
use crate::sink::{ChannelSink, LOCK_NOTICE, MessageHandle};
use crate::source::MetricSource;
use crate::{ChallengeId, ChannelId};
use chrono::Utc;
use rand::Rng as _;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::Instant;

/// Monitor loop timing. Tests shrink these to milliseconds.
#[derive(Debug, Clone)]
pub struct EngineTiming {
    pub poll_interval: Duration,
    pub debounce: Duration,
    /// Fractional jitter on the poll interval (0.2 = ±20%).
    pub jitter: f64,
    pub shutdown_grace: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            debounce: Duration::from_secs(15),
            jitter: 0.2,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl From<&EngineConfig> for EngineTiming {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            debounce: Duration::from_secs(config.debounce_secs),
            jitter: config.jitter,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

pub struct ChallengeEngine {
    registry: Arc<ChallengeRegistry>,
    history: Arc<HistoryStore>,
    timing: EngineTiming,
    /// Rolling summary display handle, one per channel the summary lives in.
    summary_handles: Mutex<HashMap<ChannelId, MessageHandle>>,
}

impl ChallengeEngine {
    pub fn new(
        registry: Arc<ChallengeRegistry>,
        history: Arc<HistoryStore>,
        timing: EngineTiming,
    ) -> Self {
        Self {
            registry,
            history,
            timing,
            summary_handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ChallengeRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Start a challenge: validate, register, lock, publish the initial
    /// displays, spawn the monitor loop. Returns without blocking on the
    /// loop. On any early failure nothing stays registered or locked.
    pub async fn start<S, K>(
        self: &Arc<Self>,
        channel_id: ChannelId,
        subject: String,
        targets: BTreeMap<String, f64>,
        timeout: Duration,
        source: Arc<S>,
        sink: Arc<K>,
    ) -> Result<ChallengeId, Error>
    where
        S: MetricSource,
        K: ChannelSink,
    {
        validate(&targets, timeout)?;

        let challenge = Challenge::new(channel_id.clone(), subject.clone(), targets, timeout);
        let challenge_id = challenge.id;
        let (shared, cancel_rx) = self.registry.try_acquire(challenge).await?;

        // First reading happens synchronously so a dead source fails the
        // start instead of locking a channel nothing will ever unlock.
        let initial = match source.fetch(&subject).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.registry.release(&channel_id).await;
                return Err(error.into());
            }
        };

        if let Err(error) = sink.lock(&channel_id).await {
            self.registry.release(&channel_id).await;
            return Err(error.into());
        }
        tracing::info!(channel = %channel_id, source = source.name(), %subject, "challenge started");

        shared.write().await.last_observed = initial;

        let lock_notice = match sink.notify(&channel_id, LOCK_NOTICE).await {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::warn!(%error, channel = %channel_id, "failed to post lock notice");
                None
            }
        };

        let initial_display = DisplayState::for_challenge(&*shared.read().await, None);
        let progress_handle = match sink
            .publish_progress(&channel_id, &initial_display, None)
            .await
        {
            Ok(handle) => {
                shared.write().await.last_published_at = Some(Utc::now());
                Some(handle)
            }
            Err(error) => {
                tracing::warn!(%error, channel = %channel_id, "failed to publish initial progress");
                None
            }
        };

        let engine = Arc::clone(self);
        let task = tokio::spawn(monitor_loop(
            engine,
            Arc::clone(&shared),
            cancel_rx,
            source,
            sink,
            lock_notice,
            progress_handle,
        ));
        self.registry.attach_task(&channel_id, task).await;

        Ok(challenge_id)
    }

    /// Request cancellation. The monitor loop observes the signal within one
    /// polling interval (plus any in-flight fetch) and runs the terminal
    /// sequence.
    pub async fn stop(&self, channel_id: &ChannelId) -> Result<(), EngineError> {
        if self.registry.cancel(channel_id).await {
            tracing::info!(channel = %channel_id, "challenge cancellation requested");
            Ok(())
        } else {
            Err(EngineError::NotFound(channel_id.clone()))
        }
    }

    /// Cancel every outstanding monitor loop and wait for their terminal
    /// sequences (which unlock the channels) within the shutdown budget.
    /// Channels still locked when the budget runs out are logged so an
    /// operator can intervene.
    pub async fn shutdown(&self) {
        let entries = self.registry.drain().await;
        if entries.is_empty() {
            return;
        }
        tracing::info!(count = entries.len(), "shutting down active challenges");

        let mut tasks = Vec::new();
        for (channel_id, entry) in entries {
            let _ = entry.cancel_tx.send(ChallengeState::Cancelled);
            if let Some(task) = entry.task {
                tasks.push((channel_id, task));
            }
        }

        let deadline = Instant::now() + self.timing.shutdown_grace;
        for (channel_id, task) in tasks {
            match tokio::time::timeout_at(deadline, task).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::error!(
                        channel = %channel_id,
                        "shutdown budget exhausted; channel may be left locked"
                    );
                }
            }
        }
    }

    /// The rolling performance summary, re-rendered after every append.
    async fn refresh_summary<K: ChannelSink>(&self, channel_id: &ChannelId, sink: &K) {
        let summary = self.history.summarize().await;
        let mut handles = self.summary_handles.lock().await;
        let existing = handles.get(channel_id).cloned();
        match sink
            .publish_summary(channel_id, &summary, existing.as_ref())
            .await
        {
            Ok(handle) => {
                handles.insert(channel_id.clone(), handle);
            }
            Err(error) => {
                tracing::warn!(%error, channel = %channel_id, "failed to update raid summary");
            }
        }
    }
}

fn validate(targets: &BTreeMap<String, f64>, timeout: Duration) -> Result<(), ValidationError> {
    if targets.is_empty() {
        return Err(ValidationError::EmptyTargets);
    }
    for (metric, value) in targets {
        if *value <= 0.0 || *value > MAX_TARGET_VALUE as f64 {
            return Err(ValidationError::TargetOutOfRange {
                metric: metric.clone(),
                value: *value,
                max: MAX_TARGET_VALUE,
            });
        }
    }

    let minutes = timeout.as_secs() / 60;
    if timeout.as_secs() % 60 != 0 || minutes < MIN_TIMEOUT_MINUTES || minutes > MAX_TIMEOUT_MINUTES
    {
        return Err(ValidationError::TimeoutOutOfRange {
            got: minutes,
            min: MIN_TIMEOUT_MINUTES,
            max: MAX_TIMEOUT_MINUTES,
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn monitor_loop<S, K>(
    engine: Arc<ChallengeEngine>,
    challenge: Arc<RwLock<Challenge>>,
    mut cancel_rx: watch::Receiver<ChallengeState>,
    source: Arc<S>,
    sink: Arc<K>,
    lock_notice: Option<MessageHandle>,
    mut progress_handle: Option<MessageHandle>,
) where
    S: MetricSource,
    K: ChannelSink,
{
    let started = Instant::now();
    let (channel_id, subject, timeout, already_published) = {
        let c = challenge.read().await;
        (
            c.channel_id.clone(),
            c.subject.clone(),
            c.timeout,
            c.last_published_at.is_some(),
        )
    };
    // The initial display posted during start opens the first debounce
    // window; the loop must not publish again until it has elapsed.
    let mut last_published: Option<Instant> = already_published.then(Instant::now);

    let outcome = loop {
        if *cancel_rx.borrow() == ChallengeState::Cancelled {
            challenge.write().await.state = ChallengeState::Cancelled;
            break ChallengeOutcome::Cancelled;
        }

        if started.elapsed() >= timeout {
            // One more reading so the timeout display reflects reality
            // instead of a stale value; a failure keeps the last snapshot.
            match source.fetch(&subject).await {
                Ok(snapshot) => challenge.write().await.last_observed = snapshot,
                Err(error) => {
                    tracing::debug!(%error, channel = %channel_id, "final fetch failed at timeout");
                }
            }
            challenge.write().await.state = ChallengeState::TimedOut;
            break ChallengeOutcome::TimedOut {
                minutes: timeout.as_secs() / 60,
            };
        }

        match source.fetch(&subject).await {
            Ok(snapshot) => {
                let met = {
                    let mut c = challenge.write().await;
                    c.last_observed = snapshot;
                    c.targets_met()
                };
                if met {
                    challenge.write().await.state = ChallengeState::Completed;
                    break ChallengeOutcome::Completed;
                }
            }
            Err(error) => {
                // Transient by definition; the cycle is skipped, the
                // last reading stands.
                tracing::warn!(%error, channel = %channel_id, source = source.name(), "metric fetch failed");
            }
        }

        let due = last_published.is_none_or(|at| at.elapsed() >= engine.timing.debounce);
        if due {
            let display = DisplayState::for_challenge(&*challenge.read().await, None);
            match sink
                .publish_progress(&channel_id, &display, progress_handle.as_ref())
                .await
            {
                Ok(handle) => {
                    progress_handle = Some(handle);
                    last_published = Some(Instant::now());
                    challenge.write().await.last_published_at = Some(Utc::now());
                }
                Err(error) => {
                    tracing::warn!(%error, channel = %channel_id, "progress publish failed");
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(jittered(engine.timing.poll_interval, engine.timing.jitter)) => {}
            _ = cancel_rx.changed() => {}
        }
    };

    run_terminal_sequence(
        &engine,
        &challenge,
        outcome,
        sink.as_ref(),
        lock_notice,
        progress_handle,
    )
    .await;
}

/// The fixed cleanup order when a challenge leaves `Active`: unlock first
/// (restores user capability), then cosmetic display work, then
/// bookkeeping. Runs exactly once per challenge; every step is
/// independently best-effort.
async fn run_terminal_sequence<K: ChannelSink>(
    engine: &ChallengeEngine,
    challenge: &Arc<RwLock<Challenge>>,
    outcome: ChallengeOutcome,
    sink: &K,
    lock_notice: Option<MessageHandle>,
    progress_handle: Option<MessageHandle>,
) {
    let snapshot = challenge.read().await.clone();
    let channel_id = snapshot.channel_id.clone();
    tracing::info!(channel = %channel_id, ?outcome, "challenge finished");

    unlock_with_retry(sink, &channel_id).await;

    let display = DisplayState::for_challenge(&snapshot, Some(outcome));
    if let Err(error) = sink
        .publish_progress(&channel_id, &display, progress_handle.as_ref())
        .await
    {
        tracing::warn!(%error, channel = %channel_id, "terminal progress publish failed");
    }

    if let Some(handle) = lock_notice
        && let Err(error) = sink.delete_if_present(&channel_id, &handle).await
    {
        tracing::debug!(%error, channel = %channel_id, "lock notice cleanup failed");
    }

    // Cancellations are operator actions, not outcomes worth a ledger row.
    if outcome != ChallengeOutcome::Cancelled {
        let record = HistoryRecord {
            subject: snapshot.subject.clone(),
            outcome: match outcome {
                ChallengeOutcome::Completed => RecordOutcome::Success,
                _ => RecordOutcome::Timeout,
            },
            timestamp: Utc::now(),
            duration_minutes: snapshot.elapsed(Utc::now()).as_secs_f64() / 60.0,
            progress: snapshot.progress_percentages(),
        };
        if let Err(error) = engine.history.append(record).await {
            tracing::error!(%error, channel = %channel_id, "history append failed");
        } else {
            engine.refresh_summary(&channel_id, sink).await;
        }
    }

    engine.registry.release(&channel_id).await;
}

/// Unlock, retrying once. A channel left locked is the worst user-visible
/// outcome, so the second failure is escalated loudly.
async fn unlock_with_retry<K: ChannelSink>(sink: &K, channel_id: &ChannelId) {
    for attempt in 0..2 {
        match sink.unlock(channel_id).await {
            Ok(()) => return,
            Err(error) if attempt == 0 => {
                tracing::warn!(%error, channel = %channel_id, "unlock failed, retrying");
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    channel = %channel_id,
                    "UNLOCK FAILED AFTER RETRY: channel left locked, operator action required"
                );
            }
        }
    }
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let offset = rand::rng().random_range(-jitter..=jitter);
    Duration::from_secs_f64((base.as_secs_f64() * (1.0 + offset)).max(0.001))
}
