use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use tokio::task;

use crate::errors::YankError;

/// Destination of the downloaded bytes. Cloning shares the same handle, so
/// every worker can write its own disjoint range concurrently.
#[derive(Debug, Clone)]
pub enum Storage {
    InMemory(MemoryStorage),
    File(FileStorage),
}

impl Storage {
    /// Writes `data` at absolute position `offset`.
    pub async fn write_at(&self, offset: u64, data: Bytes) -> io::Result<()> {
        match self {
            Storage::InMemory(s) => {
                s.write_at(offset, &data);
                Ok(())
            }
            Storage::File(f) => f.write_at(offset, data).await,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new(size: u64) -> Self {
        MemoryStorage {
            buffer: Arc::new(Mutex::new(Vec::with_capacity(
                size.try_into().unwrap_or(0),
            ))),
        }
    }

    fn write_at(&self, offset: u64, data: &[u8]) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        let start = offset as usize;
        let end = start + data.len();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(data);
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    pub path: PathBuf,
    file: Arc<File>,
}

impl FileStorage {
    /// Opens (or creates) the destination for writing without truncating it,
    /// so a resumed run can fill in the ranges that are still missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, YankError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| YankError::file_system(&path, e))?;
        Ok(FileStorage {
            path,
            file: Arc::new(file),
        })
    }

    /// Truncates or extends a regular file to exactly `len` bytes, so a stale
    /// longer file never leaves its tail behind. Devices are left alone.
    pub async fn set_len(&self, len: u64) -> Result<(), YankError> {
        let file = self.file.clone();
        task::spawn_blocking(move || -> io::Result<()> {
            let metadata = file.metadata()?;
            if metadata.is_file() && metadata.len() != len {
                file.set_len(len)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .and_then(|result| result)
        .map_err(|e| YankError::file_system(&self.path, e))
    }

    async fn write_at(&self, offset: u64, data: Bytes) -> io::Result<()> {
        let file = self.file.clone();
        task::spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
