use crate::plan::ChunkPlan;

/// Emitted by a worker after every successful positional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub chunk_id: u32,
    pub bytes_written: u64,
}

/// Receives progress from the aggregator. Rendering lives outside the core.
pub trait ProgressSink: Send + 'static {
    /// Called once before any event, with the original chunk plan.
    fn on_start(&mut self, _plan: &ChunkPlan) {}

    /// `completed` is the chunk's cumulative total, prior runs included.
    fn on_progress(&mut self, chunk_id: u32, completed: u64);

    fn on_finish(&mut self) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _chunk_id: u32, _completed: u64) {}
}
