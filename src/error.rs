// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the update sweeper.
//!
//! Errors carry the location, key, or node they concern so a single log line
//! is enough to find the offending queue entry.
//!
//! # Error Categories
//!
//! | Error Type | Kind | Retryable | Description |
//! |------------|------|-----------|-------------|
//! | `Unavailable` | Unavailable | Yes | Location queue unreachable |
//! | `Corrupt` | Corrupt | No | Entry blob failed to decode |
//! | `NotFound` | Other | No | Entry vanished before it was loaded |
//! | `Transport` | Transport | Yes | Delivery to a replica failed |
//! | `Queue` | Other | Busy only | SQLite errors from the queue adapter |
//! | `Resolve` | Other | No | Ring could not place the collection |
//! | `Config` | Other | No | Configuration invalid |
//! | `InvalidState` | Other | No | Sweeper state machine violation |
//! | `Shutdown` | Other | No | Sweeper is shutting down |
//! | `Internal` | Other | No | Unexpected internal error |
//!
//! # Classification
//!
//! The sweep driver never matches on variants. It calls
//! [`SweepError::kind()`] and switches on [`FailureKind`]: an unavailable
//! location is a warning, everything else is logged in full and counted as a
//! location failure.

use thiserror::Error;

/// Result type alias for sweeper operations.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Coarse classification the sweep driver switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The location (or its queue) could not be reached.
    Unavailable,
    /// A queue entry could not be decoded.
    Corrupt,
    /// A network delivery failed.
    Transport,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unavailable => "unavailable",
            FailureKind::Corrupt => "corrupt",
            FailureKind::Transport => "transport",
            FailureKind::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while sweeping pending updates.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Location queue unreachable.
    ///
    /// The database for a location is missing, or the connection failed.
    /// Retried automatically on the next sweep.
    #[error("Location unavailable ({location}): {message}")]
    Unavailable { location: String, message: String },

    /// Entry blob failed to decode.
    ///
    /// The entry stays queued and will fail identically until repaired.
    #[error("Corrupt pending update ({key}): {message}")]
    Corrupt { key: String, message: String },

    /// The entry was not present when it was loaded.
    #[error("Pending update not found: {key}")]
    NotFound { key: String },

    /// Delivery to one replica failed.
    ///
    /// Never escapes the processor: delivery clients report it as a
    /// non-acknowledgment.
    #[error("Transport error ({node}): {message}")]
    Transport { node: String, message: String },

    /// SQLite error from the queue adapter.
    #[error("Queue store error: {0}")]
    Queue(#[from] sqlx::Error),

    /// The replica resolver could not place a collection.
    #[error("Replica resolution error: {0}")]
    Resolve(String),

    /// Invalid or missing configuration.
    ///
    /// Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted in the wrong sweeper state.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown in progress.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SweepError {
    /// Create an unavailable-location error.
    pub fn unavailable(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a corrupt-entry error.
    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Classify this error for the sweep driver.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable { .. } => FailureKind::Unavailable,
            Self::Corrupt { .. } => FailureKind::Corrupt,
            Self::Transport { .. } => FailureKind::Transport,
            Self::NotFound { .. }
            | Self::Queue(_)
            | Self::Resolve(_)
            | Self::Config(_)
            | Self::InvalidState { .. }
            | Self::Shutdown
            | Self::Internal(_) => FailureKind::Other,
        }
    }

    /// Check if the next sweep can be expected to succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Transport { .. } => true,
            Self::Queue(e) => crate::queue::is_sqlite_busy_error(e),
            Self::Corrupt { .. } => false, // Needs repair at the source
            Self::NotFound { .. } => false,
            Self::Resolve(_) => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }
}
