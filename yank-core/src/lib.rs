//! Segmented, resumable HTTP downloads.
//!
//! A resource is probed, split into disjoint byte ranges and fetched by one
//! worker per range. Progress is folded into a per-chunk tracker that can be
//! persisted through a [`resume::ResumeStore`] so an interrupted transfer
//! picks up where it stopped.

pub mod aggregator;
pub mod cancel;
pub mod completion;
pub mod download;
pub mod downloader;
pub mod errors;
pub mod event;
pub mod plan;
pub mod pool;
pub mod resume;
pub mod storage;
pub mod tracker;
pub mod utils;

pub use downloader::{Downloader, Outcome};
pub use errors::{WorkerError, YankError};
pub use tokio_util::sync::CancellationToken;
