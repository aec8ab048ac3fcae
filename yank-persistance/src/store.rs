use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use yank_core::{
    plan::ChunkPlan,
    resume::{records_for, ResumeRecord, ResumeRecords, ResumeStore},
    tracker::Tracker,
    YankError,
};

use crate::{
    errors::MarkerError,
    models::{marker_file_name, parse_marker_file_name, Marker},
};

const TEMP_SUFFIX: &str = ".tmp";

/// Resume markers stored as one small file per chunk inside `dir`.
///
/// Markers are named after the destination file, so several downloads can
/// share a directory without touching each other's resume state.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MarkerStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn marker_path(&self, file_name: &str, chunk_id: u32) -> PathBuf {
        self.dir.join(marker_file_name(file_name, chunk_id))
    }

    /// Every marker of `file_name` currently on disk, whether or not the set is
    /// complete.
    pub async fn list(&self, file_name: &str) -> Result<ResumeRecords, MarkerError> {
        let mut records = ResumeRecords::new();
        for (chunk_id, path) in self.marker_paths(file_name, false).await? {
            records.insert(chunk_id, self.read_marker(chunk_id, &path).await?);
        }
        Ok(records)
    }

    async fn read_marker(
        &self,
        chunk_id: u32,
        path: &Path,
    ) -> Result<ResumeRecord, MarkerError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| MarkerError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        content
            .parse::<Marker>()
            .map(|marker| marker.0)
            .map_err(|_| MarkerError::Corrupt {
                path: path.to_path_buf(),
                chunk_id,
                content,
            })
    }

    /// Writes to a temporary sibling first so a crash never leaves half a
    /// marker behind.
    async fn write_marker(&self, path: &Path, marker: Marker) -> Result<(), MarkerError> {
        let mut temp = path.as_os_str().to_owned();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        let io_err = |source: io::Error| MarkerError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&temp, marker.to_string()).await.map_err(io_err)?;
        fs::rename(&temp, path).await.map_err(io_err)
    }

    /// Marker files that belong to `file_name`, optionally with leftover
    /// temporaries from an interrupted save.
    async fn marker_paths(
        &self,
        file_name: &str,
        with_temporaries: bool,
    ) -> Result<Vec<(u32, PathBuf)>, MarkerError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(MarkerError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut paths = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(MarkerError::Io {
                        path: self.dir.clone(),
                        source,
                    })
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let stem = match name.strip_suffix(TEMP_SUFFIX) {
                Some(stem) if with_temporaries => stem,
                Some(_) => continue,
                None => name,
            };
            if let Some(chunk_id) = parse_marker_file_name(stem, file_name) {
                paths.push((chunk_id, entry.path()));
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl ResumeStore for MarkerStore {
    async fn has_resume_state(&self, file_name: &str, concurrency: u32) -> bool {
        if concurrency == 0 {
            return false;
        }
        for chunk_id in 0..concurrency {
            let is_file = fs::metadata(self.marker_path(file_name, chunk_id))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                return false;
            }
        }
        true
    }

    async fn load(&self, file_name: &str, concurrency: u32) -> Result<ResumeRecords, YankError> {
        let mut records = ResumeRecords::new();
        for chunk_id in 0..concurrency {
            let path = self.marker_path(file_name, chunk_id);
            records.insert(chunk_id, self.read_marker(chunk_id, &path).await?);
        }
        debug!(file_name, markers = records.len(), "loaded resume markers");
        Ok(records)
    }

    async fn save(
        &self,
        tracker: &Tracker,
        file_name: &str,
        plan: &ChunkPlan,
    ) -> Result<(), YankError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| YankError::file_system(&self.dir, e))?;

        for (chunk_id, record) in records_for(tracker, plan) {
            let path = self.marker_path(file_name, chunk_id);
            self.write_marker(&path, Marker(record)).await?;
        }
        debug!(file_name, markers = tracker.len(), "saved resume markers");
        Ok(())
    }

    async fn clear(&self, file_name: &str) -> Result<(), YankError> {
        for (_, path) in self.marker_paths(file_name, true).await? {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(YankError::file_system(path, e)),
            }
        }
        debug!(file_name, "cleared resume markers");
        Ok(())
    }
}
