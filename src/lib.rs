//! raidlock: time-boxed engagement challenges against chat channels.
//!
//! A challenge locks a channel, polls an external numeric metric (post
//! engagement, upvotes, sentiment, on-chain buy volume) and unlocks the
//! channel automatically when every target is met or a timeout elapses.
//! The core is one generic monitor engine; everything platform-specific
//! lives behind the [`source::MetricSource`] and [`sink::ChannelSink`]
//! seams.

pub mod challenge;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod sink;
pub mod source;

pub use challenge::engine::{ChallengeEngine, EngineTiming};
pub use challenge::history::{HistoryRecord, HistoryStore, RecordOutcome, Summary};
pub use challenge::registry::ChallengeRegistry;
pub use challenge::{Challenge, ChallengeState};
pub use error::{
    EngineError, Error, FetchError, PersistenceError, Result, SinkError, ValidationError,
};

use serde::{Deserialize, Serialize};

/// Opaque identifier of a lockable channel. Platform adapters interpret it
/// (Discord channel id, Telegram chat id); the core only keys on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique id of one challenge run.
pub type ChallengeId = uuid::Uuid;
