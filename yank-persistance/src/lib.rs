use std::path::PathBuf;

use errors::MarkerError;
use tokio::fs;

pub mod errors;
pub mod models;
pub mod store;

pub use store::MarkerStore;

/// Opens the marker store rooted at `dir`, creating the directory if needed.
pub async fn get_marker_store(dir: impl Into<PathBuf>) -> Result<MarkerStore, MarkerError> {
    let dir = dir.into();
    if let Err(source) = fs::create_dir_all(&dir).await {
        return Err(MarkerError::Io { path: dir, source });
    }
    Ok(MarkerStore::new(dir))
}
