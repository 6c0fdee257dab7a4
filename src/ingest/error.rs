// src/ingest/error.rs
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single archive request or its response stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Server-busy style statuses (429/502/503/504): retried.
    #[error("server busy: HTTP {0}")]
    Busy(u16),
    /// Any other non-success status: retrying the same request won't help.
    #[error("request rejected: HTTP {0}")]
    Status(u16),
    /// Connect/read timeouts, resets, truncated bodies: retried.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Busy(_) | FetchError::Transport(_))
    }

    /// Classify an HTTP status code that is not a success.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 | 502 | 503 | 504 => FetchError::Busy(status),
            other => FetchError::Status(other),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::from_status(status.as_u16()),
            None => FetchError::Transport(e.to_string()),
        }
    }
}

/// Errors that stop a training run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("chunk {chunk} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        chunk: usize,
        attempts: u32,
        last: FetchError,
    },
    #[error("chunk {chunk} rejected by the archive: {source}")]
    Rejected {
        chunk: usize,
        #[source]
        source: FetchError,
    },
    #[error("nothing to fetch for the {archive} archive: empty chunk plan")]
    EmptyPlan { archive: String },
    #[error("writing checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("writing model snapshot {path}: {source}")]
    ModelStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
