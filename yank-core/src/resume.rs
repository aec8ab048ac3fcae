use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::{errors::YankError, plan::ChunkPlan, tracker::Tracker};

/// Persisted progress of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeRecord {
    /// Absolute position of the next byte to fetch.
    pub resume_offset: u64,
    /// The chunk's original end boundary.
    pub original_limit: u64,
}

impl ResumeRecord {
    /// Builds the record for `chunk_id` from the original (unadjusted) plan and
    /// the number of bytes the tracker holds for it.
    pub fn from_progress(plan: &ChunkPlan, chunk_id: u32, completed: u64) -> Option<Self> {
        plan.get(chunk_id).map(|chunk| ResumeRecord {
            resume_offset: (chunk.offset + completed).min(chunk.limit),
            original_limit: chunk.limit,
        })
    }
}

pub type ResumeRecords = BTreeMap<u32, ResumeRecord>;

/// Storage for resume records, scoped per destination file name.
///
/// Every operation only touches records that belong to `file_name`.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// True only when a record exists for every chunk id `0..concurrency`.
    async fn has_resume_state(&self, file_name: &str, concurrency: u32) -> bool;

    async fn load(&self, file_name: &str, concurrency: u32) -> Result<ResumeRecords, YankError>;

    /// Overwrites the record of every chunk present in the tracker.
    async fn save(
        &self,
        tracker: &Tracker,
        file_name: &str,
        plan: &ChunkPlan,
    ) -> Result<(), YankError>;

    async fn clear(&self, file_name: &str) -> Result<(), YankError>;
}

#[async_trait]
impl<T: ResumeStore + ?Sized> ResumeStore for Arc<T> {
    async fn has_resume_state(&self, file_name: &str, concurrency: u32) -> bool {
        (**self).has_resume_state(file_name, concurrency).await
    }

    async fn load(&self, file_name: &str, concurrency: u32) -> Result<ResumeRecords, YankError> {
        (**self).load(file_name, concurrency).await
    }

    async fn save(
        &self,
        tracker: &Tracker,
        file_name: &str,
        plan: &ChunkPlan,
    ) -> Result<(), YankError> {
        (**self).save(tracker, file_name, plan).await
    }

    async fn clear(&self, file_name: &str) -> Result<(), YankError> {
        (**self).clear(file_name).await
    }
}

/// Resume records for every chunk of `plan` given the tracker's totals.
pub fn records_for(tracker: &Tracker, plan: &ChunkPlan) -> ResumeRecords {
    tracker
        .iter()
        .filter_map(|(id, completed)| {
            ResumeRecord::from_progress(plan, id, completed).map(|record| (id, record))
        })
        .collect()
}
