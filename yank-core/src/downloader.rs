use std::path::{Path, PathBuf};

use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    aggregator::ProgressAggregator,
    cancel::CancellationController,
    completion::{Completion, CompletionArbiter, Shortfall},
    download::DownloadTask,
    errors::{WorkerError, YankError},
    event::ProgressSink,
    plan::ChunkPlan,
    pool::DownloadWorkerPool,
    resume::{ResumeRecords, ResumeStore},
    storage::{FileStorage, Storage},
};

/// How a download session ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every byte arrived; the resume markers are gone.
    Complete { path: PathBuf },
    /// Some chunks fell short. Markers were written so a later run can
    /// pick up where this one stopped.
    Incomplete {
        path: PathBuf,
        shortfalls: Vec<Shortfall>,
        failures: Vec<WorkerError>,
    },
    /// The cancellation token fired; the tracker was flushed to markers.
    Cancelled,
}

/// Represents a download session.
/// Download only starts when `download` is called.
pub struct Downloader<S, P> {
    /// Information on the file to download
    pub task: DownloadTask,
    /// Directory to store the file. The path has to exist.
    pub output_dir: PathBuf,
    /// Chunk plan computed from the probe, never adjusted for resume
    plan: ChunkPlan,
    store: S,
    /// Receives per-chunk progress updates
    on_progress: P,
    client: Client,
    token: CancellationToken,
}

impl<S, P> Downloader<S, P>
where
    S: ResumeStore,
    P: ProgressSink,
{
    /// Creates a download session, planning `concurrency` chunks.
    pub fn new(
        task: DownloadTask,
        output_dir: impl Into<PathBuf>,
        concurrency: u32,
        store: S,
        on_progress: P,
    ) -> Result<Self, YankError> {
        let output_dir = output_dir.into();
        if !output_dir.is_dir() {
            return Err(YankError::Config(format!(
                "output directory {} doesn't exist or path leads to a file",
                output_dir.display()
            )));
        }
        let plan = task.get_download_parts(concurrency)?;
        Ok(Downloader {
            task,
            output_dir,
            plan,
            store,
            on_progress,
            client: Client::new(),
            token: CancellationToken::new(),
        })
    }

    /// Uses an externally configured HTTP client for the chunk requests.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Cancelling this token flushes the resume state and ends the session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn destination(&self) -> PathBuf {
        self.output_dir.join(&self.task.meta.file_name)
    }

    /// Runs the session to one of its terminal states.
    pub async fn download(self) -> Result<Outcome, YankError> {
        let path = self.destination();
        let file_name = self.task.meta.file_name.as_str();

        let resume = self.load_resume_state(&path).await?;
        let work = match &resume {
            Some(records) => self.plan.resume_from(records)?,
            None => self.plan.chunks().to_vec(),
        };
        let file = FileStorage::open(&path)?;
        file.set_len(self.plan.content_length()).await?;
        let storage = Storage::File(file);

        info!(
            file_name,
            content_length = self.plan.content_length(),
            chunks = self.plan.len(),
            resumed = resume.is_some(),
            "starting download"
        );

        let aggregator = ProgressAggregator::new(&self.plan, resume.as_ref(), self.on_progress);
        let controller =
            CancellationController::new(self.token.clone(), &self.store, file_name, &self.plan);
        let pool = DownloadWorkerPool::new(self.client.clone(), self.task.file_url.clone(), storage);
        let snapshot = aggregator.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        let finished = tokio::select! {
            biased;
            saved = controller.watch(snapshot) => {
                saved?;
                None
            }
            done = async { tokio::join!(pool.run(work, tx), aggregator.run(rx)) } => Some(done),
        };
        let Some((reports, tracker)) = finished else {
            return Ok(Outcome::Cancelled);
        };

        let completion = CompletionArbiter::new(&self.store, file_name, &self.plan)
            .finalize(&tracker)
            .await?;

        let mut failures: Vec<WorkerError> =
            reports.into_iter().filter_map(|report| report.error).collect();
        if let Some(index) = failures.iter().position(WorkerError::is_fatal) {
            return Err(match failures.swap_remove(index) {
                WorkerError::Storage { source, .. } => YankError::FileSystem { path, source },
                other => other.into(),
            });
        }

        Ok(match completion {
            Completion::Complete => Outcome::Complete { path },
            Completion::Incomplete(shortfalls) => Outcome::Incomplete {
                path,
                shortfalls,
                failures,
            },
        })
    }

    /// Loads the resume set for this destination, if a complete one exists.
    async fn load_resume_state(&self, path: &Path) -> Result<Option<ResumeRecords>, YankError> {
        let file_name = self.task.meta.file_name.as_str();
        let concurrency = self.plan.len() as u32;

        if !self.store.has_resume_state(file_name, concurrency).await {
            return Ok(None);
        }
        if !path.is_file() {
            warn!(
                file_name,
                "resume markers found but the destination is missing, starting over"
            );
            self.store.clear(file_name).await?;
            return Ok(None);
        }

        let records = self.store.load(file_name, concurrency).await?;
        Ok(Some(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        download::DownloadMeta,
        event::NoProgress,
        resume::{testing::MemoryStore, ResumeRecord, ResumeRecords},
    };
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body() -> Vec<u8> {
        (0..1000u32).map(|i| (i % 251) as u8).collect()
    }

    fn task(server: &MockServer) -> DownloadTask {
        DownloadTask {
            file_url: format!("{}/data.bin", server.uri()),
            meta: DownloadMeta {
                content_length: 1000,
                file_name: "data.bin".to_string(),
                content_type: None,
            },
        }
    }

    async fn mount_chunk(server: &MockServer, start: usize, end: usize, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(header("Range", format!("bytes={}-{}", start, end - 1).as_str()))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(body()[start..end].to_vec()))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_rejects_missing_output_dir() {
        let server = MockServer::start().await;

        let result = Downloader::new(
            task(&server),
            "/definitely/not/here",
            4,
            MemoryStore::default(),
            NoProgress,
        );

        assert!(matches!(result, Err(YankError::Config(_))));
    }

    #[tokio::test]
    async fn test_fresh_download_completes() {
        let server = MockServer::start().await;
        for (start, end) in [(0, 250), (250, 500), (500, 750), (750, 1000)] {
            mount_chunk(&server, start, end, 1).await;
        }
        let dir = tempfile::tempdir().unwrap();

        let downloader =
            Downloader::new(task(&server), dir.path(), 4, MemoryStore::default(), NoProgress)
                .unwrap();
        let outcome = downloader.download().await.unwrap();

        let path = match outcome {
            Outcome::Complete { path } => path,
            other => panic!("expected a complete download, got {:?}", other),
        };
        assert_eq!(std::fs::read(path).unwrap(), body());
    }

    #[tokio::test]
    async fn test_resume_fetches_only_missing_ranges() {
        let server = MockServer::start().await;
        mount_chunk(&server, 350, 500, 1).await;
        mount_chunk(&server, 500, 750, 1).await;
        mount_chunk(&server, 750, 1000, 1).await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=0-249"))
            .respond_with(ResponseTemplate::new(206))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut partial = body();
        partial[350..].iter_mut().for_each(|b| *b = 0);
        std::fs::write(dir.path().join("data.bin"), &partial).unwrap();
        let records: ResumeRecords = [(250, 250), (350, 500), (500, 750), (750, 1000)]
            .into_iter()
            .enumerate()
            .map(|(id, (resume_offset, original_limit))| {
                (
                    id as u32,
                    ResumeRecord {
                        resume_offset,
                        original_limit,
                    },
                )
            })
            .collect();
        let store = MemoryStore::with_records("data.bin", records);

        let downloader = Downloader::new(task(&server), dir.path(), 4, store, NoProgress).unwrap();
        let outcome = downloader.download().await.unwrap();

        assert!(matches!(outcome, Outcome::Complete { .. }));
        assert_eq!(std::fs::read(dir.path().join("data.bin")).unwrap(), body());
    }

    #[tokio::test]
    async fn test_failed_chunk_leaves_resumable_state() {
        let server = MockServer::start().await;
        mount_chunk(&server, 0, 500, 1).await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=500-999"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();

        let downloader = Downloader::new(task(&server), dir.path(), 2, store, NoProgress).unwrap();
        let outcome = downloader.download().await.unwrap();

        let (shortfalls, failures) = match outcome {
            Outcome::Incomplete {
                shortfalls,
                failures,
                ..
            } => (shortfalls, failures),
            other => panic!("expected an incomplete download, got {:?}", other),
        };
        assert_eq!(shortfalls.len(), 1);
        assert_eq!(shortfalls[0].chunk_id, 1);
        assert_eq!(failures.len(), 1);
        assert!(dir.path().join("data.bin").is_file());
    }

    #[tokio::test]
    async fn test_fresh_download_drops_stale_tail() {
        let server = MockServer::start().await;
        mount_chunk(&server, 0, 1000, 1).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), vec![b'X'; 3000]).unwrap();

        let downloader =
            Downloader::new(task(&server), dir.path(), 1, MemoryStore::default(), NoProgress)
                .unwrap();
        let outcome = downloader.download().await.unwrap();

        assert!(matches!(outcome, Outcome::Complete { .. }));
        assert_eq!(std::fs::read(dir.path().join("data.bin")).unwrap(), body());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_write_failure_is_fatal_file_system_error() {
        use std::time::{Duration, Instant};

        let server = MockServer::start().await;
        mount_chunk(&server, 0, 500, 1).await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=500-999"))
            .respond_with(
                ResponseTemplate::new(206)
                    .set_body_bytes(body()[500..].to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let mut task = task(&server);
        task.meta.file_name = "full".to_string();
        let store = std::sync::Arc::new(MemoryStore::default());

        let downloader = Downloader::new(task, "/dev", 2, store.clone(), NoProgress).unwrap();
        let started = Instant::now();
        let result = downloader.download().await;

        assert!(started.elapsed() < Duration::from_secs(3));
        match result {
            Err(YankError::FileSystem { path, .. }) => assert_eq!(path, PathBuf::from("/dev/full")),
            other => panic!("expected a file system error, got {:?}", other),
        }
        let records = store.records("full").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[&0].resume_offset, 0);
    }

    #[tokio::test]
    async fn test_cancelled_session_flushes_tracker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(206)
                    .set_body_bytes(vec![1u8; 500])
                    .set_delay(std::time::Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(MemoryStore::default());

        let downloader =
            Downloader::new(task(&server), dir.path(), 2, store.clone(), NoProgress).unwrap();
        downloader.cancellation_token().cancel();
        let outcome = downloader.download().await.unwrap();

        assert!(matches!(outcome, Outcome::Cancelled));
        let records = store.records("data.bin").unwrap();
        assert_eq!(records[&0].resume_offset, 0);
        assert_eq!(records[&1].resume_offset, 500);
        assert_eq!(records[&1].original_limit, 1000);
    }
}
