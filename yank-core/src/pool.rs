use futures_util::{future::join_all, StreamExt};
use reqwest::{header, Client, StatusCode};
use tokio::{sync::mpsc::UnboundedSender, task};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    errors::WorkerError,
    event::ProgressEvent,
    plan::Chunk,
    storage::Storage,
};

/// How a single chunk worker ended.
#[derive(Debug)]
pub struct ChunkReport {
    pub chunk_id: u32,
    /// Bytes written during this run.
    pub written: u64,
    pub error: Option<WorkerError>,
}

/// Runs one worker per chunk, all writing into the same storage.
#[derive(Debug, Clone)]
pub struct DownloadWorkerPool {
    client: Client,
    file_url: String,
    storage: Storage,
}

impl DownloadWorkerPool {
    pub fn new(client: Client, file_url: String, storage: Storage) -> Self {
        DownloadWorkerPool {
            client,
            file_url,
            storage,
        }
    }

    /// Downloads every chunk concurrently and waits for all of them, failed
    /// ones included. `events` is dropped on return, which closes the
    /// channel for the aggregator.
    ///
    /// A storage failure is fatal for the session: the remaining workers are
    /// stopped right away and report `WorkerError::Aborted`.
    pub async fn run(
        self,
        chunks: Vec<Chunk>,
        events: UnboundedSender<ProgressEvent>,
    ) -> Vec<ChunkReport> {
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        let mut join_handles = Vec::with_capacity(chunks.len());
        let abort = CancellationToken::new();

        for chunk in chunks.into_iter().filter(|c| !c.is_satisfied()) {
            let client = self.client.clone();
            let url = self.file_url.clone();
            let storage = self.storage.clone();
            let tx = events.clone();
            let abort = abort.clone();
            chunk_ids.push(chunk.id);
            join_handles.push(task::spawn(async move {
                let result: Result<u64, (u64, WorkerError)> = tokio::select! {
                    biased;
                    _ = abort.cancelled() => {
                        Err((0, WorkerError::Aborted { chunk_id: chunk.id }))
                    }
                    result = download_chunk(&client, &url, &storage, chunk, &tx) => result,
                };
                match &result {
                    Err((_, e)) if e.is_fatal() => {
                        error!("{}", e);
                        abort.cancel();
                    }
                    Err((_, e)) => warn!("{}", e),
                    Ok(_) => {}
                }
                result
            }));
        }

        let results = join_all(join_handles).await;
        drop(events);

        chunk_ids
            .into_iter()
            .zip(results)
            .map(|(chunk_id, result)| {
                let (written, error) = match result {
                    Ok(Ok(written)) => (written, None),
                    Ok(Err((written, e))) => (written, Some(e)),
                    Err(_) => {
                        warn!(chunk_id, "worker panicked");
                        (0, Some(WorkerError::Panicked { chunk_id }))
                    }
                };
                ChunkReport {
                    chunk_id,
                    written,
                    error,
                }
            })
            .collect()
    }
}

/// Streams `[chunk.offset, chunk.limit)` into storage, reporting every write.
/// On failure the bytes written before the error are returned alongside it.
async fn download_chunk(
    client: &Client,
    url: &str,
    storage: &Storage,
    chunk: Chunk,
    tx: &UnboundedSender<ProgressEvent>,
) -> Result<u64, (u64, WorkerError)> {
    let chunk_id = chunk.id;
    debug!(chunk_id, range = %chunk.range_header(), "requesting chunk");

    let response = client
        .get(url)
        .header(header::RANGE, chunk.range_header())
        .send()
        .await
        .map_err(|source| (0, WorkerError::Transport { chunk_id, source }))?;

    if response.status() != StatusCode::PARTIAL_CONTENT {
        return Err((
            0,
            WorkerError::UnexpectedStatus {
                chunk_id,
                status: response.status(),
            },
        ));
    }

    let mut cursor = chunk.offset;
    let mut bytes_stream = response.bytes_stream();

    while let Some(data) = bytes_stream.next().await {
        let written = cursor - chunk.offset;
        let mut bytes =
            data.map_err(|source| (written, WorkerError::Transport { chunk_id, source }))?;

        // Some servers ignore the range end; never spill into the next chunk.
        let remaining = chunk.limit - cursor;
        if bytes.len() as u64 > remaining {
            bytes.truncate(remaining as usize);
        }
        if bytes.is_empty() {
            if remaining == 0 {
                break;
            }
            continue;
        }

        let len = bytes.len() as u64;
        storage
            .write_at(cursor, bytes)
            .await
            .map_err(|source| (written, WorkerError::Storage { chunk_id, source }))?;
        cursor += len;

        if tx
            .send(ProgressEvent {
                chunk_id,
                bytes_written: len,
            })
            .is_err()
        {
            // Nobody is tracking progress anymore; the session is gone.
            break;
        }
    }

    let written = cursor - chunk.offset;
    debug!(chunk_id, written, expected = chunk.expected_size(), "chunk stream ended");
    Ok(written)
}
