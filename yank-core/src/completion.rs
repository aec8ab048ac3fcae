use tracing::info;

use crate::{errors::YankError, plan::ChunkPlan, resume::ResumeStore, tracker::Tracker};

/// A chunk that ended the run with fewer bytes than planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub chunk_id: u32,
    pub completed: u64,
    pub expected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Every chunk is complete; resume markers were discarded.
    Complete,
    /// Some chunks fell short; resume markers were written for all chunks.
    Incomplete(Vec<Shortfall>),
}

/// Chunks of `plan` the tracker doesn't cover in full.
pub fn shortfalls(plan: &ChunkPlan, tracker: &Tracker) -> Vec<Shortfall> {
    plan.iter()
        .filter_map(|chunk| {
            let completed = tracker.completed(chunk.id);
            (completed < chunk.expected_size()).then(|| Shortfall {
                chunk_id: chunk.id,
                completed,
                expected: chunk.expected_size(),
            })
        })
        .collect()
}

/// Decides what happens to the resume state after a normal (uninterrupted)
/// run.
pub struct CompletionArbiter<'a, S: ?Sized> {
    store: &'a S,
    file_name: &'a str,
    plan: &'a ChunkPlan,
}

impl<'a, S: ResumeStore + ?Sized> CompletionArbiter<'a, S> {
    pub fn new(store: &'a S, file_name: &'a str, plan: &'a ChunkPlan) -> Self {
        CompletionArbiter {
            store,
            file_name,
            plan,
        }
    }

    /// Clears the markers when everything arrived, otherwise persists the
    /// tracker. The destination file is left as it is in both cases.
    pub async fn finalize(&self, tracker: &Tracker) -> Result<Completion, YankError> {
        let missing = shortfalls(self.plan, tracker);
        if missing.is_empty() {
            self.store.clear(self.file_name).await?;
            info!(file_name = self.file_name, "download complete");
            return Ok(Completion::Complete);
        }

        self.store.save(tracker, self.file_name, self.plan).await?;
        info!(
            file_name = self.file_name,
            incomplete_chunks = missing.len(),
            "download incomplete, resume state saved"
        );
        Ok(Completion::Incomplete(missing))
    }
}
