use std::path::{Path, PathBuf};

use clap::Subcommand;
use prettytable::Table;
use reqwest::{Client, Url};
use tracing::{info, warn};
use yank_core::{
    download::DownloadTask,
    resume::{ResumeRecords, ResumeStore},
    utils::create_dir_if_missing,
    Downloader, Outcome, YankError,
};
use yank_persistance::{get_marker_store, MarkerStore};

use crate::progress::ChunkBars;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_INCOMPLETE: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Directory, relative to the output directory, used for resume markers when
/// none is given.
pub const MARKER_DIR: &str = ".yank";

#[derive(Subcommand)]
pub enum Commands {
    /// Download a file
    Download {
        #[clap(value_parser)]
        url: String,
        /// Number of chunks downloaded concurrently
        #[clap(long, short, env = "YANK_CONCURRENCY", default_value_t = 4, value_parser)]
        concurrency: u32,
        #[clap(long, short, env = "YANK_OUTPUT_DIR", default_value = ".", value_parser)]
        output_dir: PathBuf,
        /// Where resume markers are kept [default: <OUTPUT_DIR>/.yank]
        #[clap(long, env = "YANK_MARKER_DIR", value_parser)]
        marker_dir: Option<PathBuf>,
    },
    /// Show the resume markers of a destination file
    Status {
        #[clap(value_parser)]
        file_name: String,
        /// Concurrency the next download will use [default: number of markers]
        #[clap(long, short, value_parser)]
        concurrency: Option<u32>,
        #[clap(long, short, env = "YANK_OUTPUT_DIR", default_value = ".", value_parser)]
        output_dir: PathBuf,
        #[clap(long, env = "YANK_MARKER_DIR", value_parser)]
        marker_dir: Option<PathBuf>,
    },
    /// Remove the resume markers of a destination file
    Clean {
        #[clap(value_parser)]
        file_name: String,
        #[clap(long, short, env = "YANK_OUTPUT_DIR", default_value = ".", value_parser)]
        output_dir: PathBuf,
        #[clap(long, env = "YANK_MARKER_DIR", value_parser)]
        marker_dir: Option<PathBuf>,
    },
}

pub fn marker_dir_or_default(output_dir: &Path, marker_dir: Option<PathBuf>) -> PathBuf {
    marker_dir.unwrap_or_else(|| output_dir.join(MARKER_DIR))
}

pub async fn handle_download(
    url: String,
    concurrency: u32,
    output_dir: PathBuf,
    marker_dir: Option<PathBuf>,
    quiet: bool,
) -> Result<i32, YankError> {
    if let Err(e) = Url::parse(&url) {
        return Err(YankError::Config(format!("invalid url {}: {}", url, e)));
    }

    info!("Profiling file to download....");
    let client = Client::new();
    let task = DownloadTask::new(&client, &url).await?;
    create_dir_if_missing(&output_dir).await?;

    println!(
        "File Name : {fname}\nFile Size : {fsize} bytes\n",
        fname = task.meta.file_name,
        fsize = task.meta.content_length
    );

    let store = get_marker_store(marker_dir_or_default(&output_dir, marker_dir)).await?;
    let downloader = Downloader::new(task, &output_dir, concurrency, store, ChunkBars::new(quiet))?
        .with_client(client);

    let token = downloader.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    match downloader.download().await? {
        Outcome::Complete { path } => {
            println!(
                "File downloaded successfully\nOutput : {}",
                path.to_string_lossy()
            );
            Ok(EXIT_OK)
        }
        Outcome::Incomplete {
            path,
            shortfalls,
            failures,
        } => {
            for failure in &failures {
                warn!("{}", failure);
            }
            for s in &shortfalls {
                eprintln!(
                    "chunk {} : {}/{} bytes",
                    s.chunk_id, s.completed, s.expected
                );
            }
            eprintln!(
                "Download of {} is incomplete, run the same command again to resume",
                path.to_string_lossy()
            );
            Ok(EXIT_INCOMPLETE)
        }
        Outcome::Cancelled => {
            eprintln!("Download interrupted, resume state saved");
            Ok(EXIT_INTERRUPTED)
        }
    }
}

pub async fn handle_status(
    file_name: String,
    concurrency: Option<u32>,
    output_dir: PathBuf,
    marker_dir: Option<PathBuf>,
) -> Result<i32, YankError> {
    let store = MarkerStore::new(marker_dir_or_default(&output_dir, marker_dir));
    let records = store.list(&file_name).await?;

    if records.is_empty() {
        println!("No resume markers for {}.", file_name);
        return Ok(EXIT_OK);
    }

    let mut table = Table::new();
    table.set_titles(row!["Chunk", "Resume offset", "Limit", "Remaining bytes"]);
    for (chunk_id, record) in &records {
        table.add_row(row![
            chunk_id,
            record.resume_offset,
            record.original_limit,
            record.original_limit.saturating_sub(record.resume_offset)
        ]);
    }
    table.printstd();

    match resumable_with(&store, &file_name, &records, concurrency).await {
        Some(concurrency) => println!("Resumable with --concurrency {}", concurrency),
        None => println!(
            "Resume set doesn't match {} chunks, the next download starts over",
            concurrency.unwrap_or(records.len() as u32)
        ),
    }
    Ok(EXIT_OK)
}

/// The concurrency a download must use to resume from `records`, if any.
/// Without an explicit value the number of markers on disk is assumed.
async fn resumable_with(
    store: &MarkerStore,
    file_name: &str,
    records: &ResumeRecords,
    concurrency: Option<u32>,
) -> Option<u32> {
    let concurrency = concurrency.unwrap_or(records.len() as u32);
    if records.len() != concurrency as usize {
        return None;
    }
    store
        .has_resume_state(file_name, concurrency)
        .await
        .then_some(concurrency)
}

pub async fn handle_clean(
    file_name: String,
    output_dir: PathBuf,
    marker_dir: Option<PathBuf>,
) -> Result<i32, YankError> {
    let store = MarkerStore::new(marker_dir_or_default(&output_dir, marker_dir));
    store.clear(&file_name).await?;
    println!("Removed resume markers for {}", file_name);
    Ok(EXIT_OK)
}
