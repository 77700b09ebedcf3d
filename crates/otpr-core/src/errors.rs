use std::path::PathBuf;

use crate::domain::DestinationId;

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the poller and
/// the control plane can tell operator-visible failures from per-cycle noise.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network failure, timeout, bad status or malformed payload on fetch.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("delivery to {destination} failed: {reason}")]
    DeliveryFailed {
        destination: DestinationId,
        reason: String,
    },

    #[error("destination not found: {0}")]
    NotFound(DestinationId),

    /// A durable write did not complete; the triggering operation did not happen.
    #[error("persistence failure: {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// Durable state exists but cannot be read back.
    #[error("corrupt state file: {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
