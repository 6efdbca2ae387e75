use std::{path::PathBuf, time::Duration};

use crate::retry::{classify, FailureClass};

/// Core error type.
///
/// Adapter crates map their transport errors into [`RemoteError`]; everything above
/// the port boundary works with this type. Only the workflow turns it into a
/// user-facing `ExportResult`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("{operation} failed: {source}")]
    Remote {
        operation: String,
        #[source]
        source: RemoteError,
    },

    #[error("{operation}: retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: RemoteError,
    },

    #[error(
        "{operation}: server asked to wait {retry_after:?}, above the {max:?} limit: {last}"
    )]
    FloodWaitTooLong {
        operation: String,
        retry_after: Duration,
        max: Duration,
        last: RemoteError,
    },

    #[error("page limit exceeded after {pages} pages (source never signalled the end)")]
    PageLimitExceeded { pages: u32 },

    #[error("deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a [`RemoteSource`](crate::ports::RemoteSource).
///
/// Adapters should pick the structural variant whenever the transport tells them
/// what happened. `Unclassified` is for errors that only carry text; those go
/// through the keyword classifier.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("transient: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("{0}")]
    Unclassified(String),
}

impl RemoteError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::RateLimited { .. } => FailureClass::RateLimited,
            Self::Transient(_) => FailureClass::Transient,
            Self::Fatal(_) => FailureClass::Fatal,
            Self::Unclassified(msg) => classify(msg),
        }
    }

    /// Server-provided wait, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
