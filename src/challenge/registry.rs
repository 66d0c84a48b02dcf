//! Active-challenge registry: at most one running challenge per channel.
//!
//! The registry is the single source of truth for "is this channel under a
//! challenge". Mutations are short atomic operations; nothing holds the map
//! lock across a suspension point.

use crate::challenge::{Challenge, ChallengeState};
use crate::error::EngineError;
use crate::ChannelId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

/// A registered challenge plus the handles its monitor loop is driven by.
pub(crate) struct ActiveEntry {
    pub challenge: Arc<RwLock<Challenge>>,
    /// Cooperative cancellation signal observed by the monitor loop.
    pub cancel_tx: watch::Sender<ChallengeState>,
    /// Monitor task, attached right after spawn; awaited during shutdown.
    pub task: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct ChallengeRegistry {
    inner: Mutex<HashMap<ChannelId, ActiveEntry>>,
}

impl ChallengeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically register a challenge for its channel. Fails with
    /// `AlreadyActive` without touching the existing entry.
    pub(crate) async fn try_acquire(
        &self,
        challenge: Challenge,
    ) -> Result<(Arc<RwLock<Challenge>>, watch::Receiver<ChallengeState>), EngineError> {
        let channel_id = challenge.channel_id.clone();
        let mut inner = self.inner.lock().await;
        if inner.contains_key(&channel_id) {
            return Err(EngineError::AlreadyActive(channel_id));
        }

        let (cancel_tx, cancel_rx) = watch::channel(ChallengeState::Active);
        let shared = Arc::new(RwLock::new(challenge));
        inner.insert(
            channel_id,
            ActiveEntry {
                challenge: Arc::clone(&shared),
                cancel_tx,
                task: None,
            },
        );
        Ok((shared, cancel_rx))
    }

    /// Record the monitor task handle for a registered challenge.
    pub(crate) async fn attach_task(&self, channel_id: &ChannelId, task: JoinHandle<()>) {
        if let Some(entry) = self.inner.lock().await.get_mut(channel_id) {
            entry.task = Some(task);
        }
    }

    /// Snapshot of the registered challenge, if any.
    pub async fn get(&self, channel_id: &ChannelId) -> Option<Challenge> {
        let shared = {
            let inner = self.inner.lock().await;
            inner.get(channel_id).map(|entry| Arc::clone(&entry.challenge))
        };
        match shared {
            Some(challenge) => Some(challenge.read().await.clone()),
            None => None,
        }
    }

    /// Signal cancellation to the channel's monitor loop. Returns false when
    /// no challenge is registered.
    pub async fn cancel(&self, channel_id: &ChannelId) -> bool {
        let inner = self.inner.lock().await;
        match inner.get(channel_id) {
            Some(entry) => entry.cancel_tx.send(ChallengeState::Cancelled).is_ok(),
            None => false,
        }
    }

    /// Idempotent removal; releasing an unregistered channel is a no-op.
    pub async fn release(&self, channel_id: &ChannelId) {
        self.inner.lock().await.remove(channel_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Remove and return every entry. Used by shutdown to cancel and await
    /// all monitor loops.
    pub(crate) async fn drain(&self) -> Vec<(ChannelId, ActiveEntry)> {
        self.inner.lock().await.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn sample_challenge(channel: &str) -> Challenge {
        Challenge::new(
            ChannelId::from(channel),
            "https://twitter.com/u/status/1",
            BTreeMap::from([("likes".to_owned(), 100.0)]),
            Duration::from_secs(900),
        )
    }

    #[tokio::test]
    async fn second_acquire_for_same_channel_fails() {
        let registry = ChallengeRegistry::new();
        registry
            .try_acquire(sample_challenge("a"))
            .await
            .expect("first acquire should succeed");

        let err = registry
            .try_acquire(sample_challenge("a"))
            .await
            .expect_err("second acquire should fail");
        assert!(matches!(err, EngineError::AlreadyActive(_)));

        // The original registration is untouched.
        assert!(registry.get(&ChannelId::from("a")).await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let registry = ChallengeRegistry::new();
        registry.try_acquire(sample_challenge("a")).await.unwrap();
        registry.try_acquire(sample_challenge("b")).await.unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let registry = ChallengeRegistry::new();
        registry.try_acquire(sample_challenge("a")).await.unwrap();

        let channel = ChannelId::from("a");
        registry.release(&channel).await;
        registry.release(&channel).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn cancel_without_challenge_reports_false() {
        let registry = ChallengeRegistry::new();
        assert!(!registry.cancel(&ChannelId::from("nope")).await);
    }

    #[tokio::test]
    async fn cancel_signals_the_monitor_side() {
        let registry = ChallengeRegistry::new();
        let (_challenge, mut cancel_rx) = registry
            .try_acquire(sample_challenge("a"))
            .await
            .unwrap();

        assert!(registry.cancel(&ChannelId::from("a")).await);
        cancel_rx.changed().await.expect("signal should arrive");
        assert_eq!(*cancel_rx.borrow(), ChallengeState::Cancelled);
    }
}
