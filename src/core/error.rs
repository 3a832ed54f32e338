//! Error types for the chiselgrid engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    /// A coordinate or index violated its documented bounds.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Tree or compact input could not be decoded.
    #[error("Corrupt persisted data: {0}")]
    CorruptPersisted(String),

    /// Derived artifact computation failed.
    #[error("Compute failure: {0}")]
    ComputeFailure(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Primary-context work was attempted off the designated thread.
    #[error("Primary context work attempted off the primary thread")]
    WrongThread,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an `OutOfRange` error with a formatted message.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Shorthand for a `CorruptPersisted` error with a formatted message.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptPersisted(msg.into())
    }
}
