use std::path::Path;
use tokio::fs;

use crate::errors::YankError;

/// Checks if a directory exists.
pub async fn check_dir_exists(dir_path: &Path) -> bool {
    fs::metadata(dir_path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Creates `dir_path` (and its parents) unless it already exists.
pub async fn create_dir_if_missing(dir_path: &Path) -> Result<(), YankError> {
    if !check_dir_exists(dir_path).await {
        fs::create_dir_all(dir_path)
            .await
            .map_err(|e| YankError::file_system(dir_path, e))?;
    }
    Ok(())
}
