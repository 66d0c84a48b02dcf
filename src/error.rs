//! Error taxonomy.
//!
//! The taxonomy mirrors how failures are actually handled: validation and
//! mutual-exclusion errors are rejected before any side effect, fetch errors
//! merely skip a poll cycle, sink errors are retried or dropped depending on
//! how user-visible the effect is, and persistence errors never block an
//! unlock.

use crate::ChannelId;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Bad user input, rejected before any side effect.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("no valid targets were provided")]
    EmptyTargets,

    #[error("target {metric}:{value} is out of range (values must be in 1..={max})")]
    TargetOutOfRange {
        metric: String,
        value: f64,
        max: u64,
    },

    #[error("timeout must be between {min} and {max} minutes, got {got}")]
    TimeoutOutOfRange { got: u64, min: u64, max: u64 },

    #[error("invalid subject reference: {0}")]
    InvalidSubject(String),
}

/// Challenge lifecycle errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("channel {0} already has an active challenge")]
    AlreadyActive(ChannelId),

    #[error("channel {0} has no active challenge")]
    NotFound(ChannelId),

    #[error("engine is shutting down")]
    ShuttingDown,
}

/// Transient metric-source failure. Never fatal for a running challenge;
/// the monitor loop logs it and retries on the next cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned unusable data: {0}")]
    Malformed(String),

    #[error("source feed is not connected")]
    Disconnected,
}

/// Channel sink failure (lock, unlock, publish, delete).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink api error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// History ledger failure. Logged, never propagated into the terminal
/// sequence ahead of the unlock.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
