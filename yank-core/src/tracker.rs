use std::collections::BTreeMap;

use crate::{plan::ChunkPlan, resume::ResumeRecords};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Entry {
    /// Bytes credited to this chunk so far.
    total: u64,
    /// Progress from a previous run, credited on the first event.
    pending_credit: u64,
}

/// Cumulative bytes completed per chunk, across all runs.
///
/// Only the progress aggregator mutates a tracker; everyone else reads
/// snapshots of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tracker {
    entries: BTreeMap<u32, Entry>,
}

impl Tracker {
    /// One entry per planned chunk, carrying the prior progress recorded in
    /// `resume` (if any) as a pending credit.
    pub fn new(plan: &ChunkPlan, resume: Option<&ResumeRecords>) -> Self {
        let entries = plan
            .iter()
            .map(|chunk| {
                let pending_credit = resume
                    .and_then(|records| records.get(&chunk.id))
                    .map(|record| record.resume_offset.saturating_sub(chunk.offset))
                    .unwrap_or(0);
                (
                    chunk.id,
                    Entry {
                        total: 0,
                        pending_credit,
                    },
                )
            })
            .collect();
        Tracker { entries }
    }

    /// Adds `bytes` to `chunk_id`, first crediting prior progress if this is
    /// the chunk's first event. Returns the chunk's new total.
    pub fn record(&mut self, chunk_id: u32, bytes: u64) -> u64 {
        let entry = self.entries.entry(chunk_id).or_default();
        entry.total += std::mem::take(&mut entry.pending_credit) + bytes;
        entry.total
    }

    /// Credits every chunk that never produced an event.
    pub fn settle(&mut self) {
        for entry in self.entries.values_mut() {
            entry.total += std::mem::take(&mut entry.pending_credit);
        }
    }

    /// Durable bytes of `chunk_id`, including prior progress not yet credited.
    pub fn completed(&self, chunk_id: u32) -> u64 {
        self.entries
            .get(&chunk_id)
            .map(|e| e.total + e.pending_credit)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.entries
            .iter()
            .map(|(id, e)| (*id, e.total + e.pending_credit))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.iter().map(|(_, completed)| completed).sum()
    }
}
