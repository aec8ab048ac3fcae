use std::{io, path::PathBuf};

use thiserror::Error;
use yank_core::YankError;

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: expected `<offset>,<limit>`, found {content:?}")]
    Corrupt {
        path: PathBuf,
        chunk_id: u32,
        content: String,
    },
}

impl From<MarkerError> for YankError {
    fn from(e: MarkerError) -> Self {
        match e {
            MarkerError::Io { path, source } => YankError::FileSystem { path, source },
            MarkerError::Corrupt {
                path,
                chunk_id,
                content,
            } => YankError::MarkerCorrupt {
                chunk_id,
                reason: format!("{}: {:?} is not `<offset>,<limit>`", path.display(), content),
            },
        }
    }
}
