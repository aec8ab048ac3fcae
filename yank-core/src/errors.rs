use std::{io, path::PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that abort a download session.
#[derive(Debug, Error)]
pub enum YankError {
    /// The capability probe rejected the resource.
    #[error("probe failed: {0}")]
    Probe(String),
    /// The probe request itself could not be sent.
    #[error("network error: {0}")]
    NetWork(#[from] reqwest::Error),
    /// A resume marker exists but its content can't be trusted.
    #[error("corrupt resume marker for chunk {chunk_id}: {reason}")]
    MarkerCorrupt { chunk_id: u32, reason: String },
    #[error("{path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A worker failed in a way that makes the session fatal.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl YankError {
    pub fn file_system(path: impl Into<PathBuf>, source: io::Error) -> Self {
        YankError::FileSystem {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single chunk worker. Never cancels sibling workers.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("chunk {chunk_id}: server responded with {status}, expected 206 Partial Content")]
    UnexpectedStatus { chunk_id: u32, status: StatusCode },
    #[error("chunk {chunk_id}: {source}")]
    Transport {
        chunk_id: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("chunk {chunk_id}: write failed: {source}")]
    Storage {
        chunk_id: u32,
        #[source]
        source: io::Error,
    },
    #[error("chunk {chunk_id}: worker panicked")]
    Panicked { chunk_id: u32 },
    /// Stopped because a sibling hit a fatal storage failure.
    #[error("chunk {chunk_id}: stopped after a write failure elsewhere")]
    Aborted { chunk_id: u32 },
}

impl WorkerError {
    pub fn chunk_id(&self) -> u32 {
        match self {
            WorkerError::UnexpectedStatus { chunk_id, .. }
            | WorkerError::Transport { chunk_id, .. }
            | WorkerError::Storage { chunk_id, .. }
            | WorkerError::Panicked { chunk_id }
            | WorkerError::Aborted { chunk_id } => *chunk_id,
        }
    }

    /// Storage failures are fatal for the whole session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::Storage { .. })
    }
}
