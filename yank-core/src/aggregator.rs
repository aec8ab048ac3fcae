use tokio::sync::{mpsc::UnboundedReceiver, watch};
use tracing::trace;

use crate::{
    event::{ProgressEvent, ProgressSink},
    plan::ChunkPlan,
    resume::ResumeRecords,
    tracker::Tracker,
};

/// Sole consumer of progress events and sole writer of the tracker.
///
/// The tracker lives inside a watch channel: the aggregator mutates it in
/// place, readers (the cancellation controller) borrow a consistent snapshot.
pub struct ProgressAggregator<P> {
    tracker: watch::Sender<Tracker>,
    sink: P,
}

impl<P: ProgressSink> ProgressAggregator<P> {
    pub fn new(plan: &ChunkPlan, resume: Option<&ResumeRecords>, mut sink: P) -> Self {
        sink.on_start(plan);
        let (tracker, _) = watch::channel(Tracker::new(plan, resume));
        ProgressAggregator { tracker, sink }
    }

    /// Handle for reading tracker snapshots while the aggregator runs.
    pub fn subscribe(&self) -> watch::Receiver<Tracker> {
        self.tracker.subscribe()
    }

    /// Consumes events until every producer is gone, then credits chunks
    /// that never reported and returns the final tracker.
    pub async fn run(mut self, mut events: UnboundedReceiver<ProgressEvent>) -> Tracker {
        while let Some(event) = events.recv().await {
            self.apply(event);
        }

        self.tracker.send_modify(Tracker::settle);
        for (chunk_id, completed) in self.tracker.borrow().iter() {
            self.sink.on_progress(chunk_id, completed);
        }
        self.sink.on_finish();

        let tracker = self.tracker.borrow().clone();
        tracker
    }

    fn apply(&mut self, event: ProgressEvent) {
        let mut total = 0;
        self.tracker.send_modify(|tracker| {
            total = tracker.record(event.chunk_id, event.bytes_written);
        });
        trace!(chunk_id = event.chunk_id, total, "progress");
        self.sink.on_progress(event.chunk_id, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::{ResumeRecord, ResumeRecords};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(u32, u64)>>>);

    impl ProgressSink for Recorder {
        fn on_progress(&mut self, chunk_id: u32, completed: u64) {
            self.0.lock().unwrap().push((chunk_id, completed));
        }
    }

    fn event(chunk_id: u32, bytes_written: u64) -> ProgressEvent {
        ProgressEvent {
            chunk_id,
            bytes_written,
        }
    }

    #[tokio::test]
    async fn test_aggregates_until_channel_closes() {
        let plan = ChunkPlan::new(1000, 4).unwrap();
        let aggregator = ProgressAggregator::new(&plan, None, Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();

        for e in [event(0, 100), event(1, 50), event(0, 150), event(3, 0)] {
            tx.send(e).unwrap();
        }
        drop(tx);

        let tracker = aggregator.run(rx).await;

        assert_eq!(tracker.completed(0), 250);
        assert_eq!(tracker.completed(1), 50);
        assert_eq!(tracker.completed(2), 0);
        assert_eq!(tracker.completed(3), 0);
    }

    #[tokio::test]
    async fn test_resumed_chunk_credited_on_first_event() {
        let plan = ChunkPlan::new(1000, 4).unwrap();
        let records: ResumeRecords = plan
            .iter()
            .map(|c| {
                let resume_offset = if c.id == 1 { 350 } else { c.offset };
                (
                    c.id,
                    ResumeRecord {
                        resume_offset,
                        original_limit: c.limit,
                    },
                )
            })
            .collect();
        let recorder = Recorder::default();
        let aggregator = ProgressAggregator::new(&plan, Some(&records), recorder.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(event(1, 50)).unwrap();
        tx.send(event(1, 100)).unwrap();
        drop(tx);
        let tracker = aggregator.run(rx).await;

        assert_eq!(tracker.completed(1), 250);
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(&seen[..2], &[(1, 150), (1, 250)]);
    }

    #[tokio::test]
    async fn test_snapshot_follows_progress() {
        let plan = ChunkPlan::new(100, 1).unwrap();
        let aggregator = ProgressAggregator::new(&plan, None, Recorder::default());
        let snapshot = aggregator.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(event(0, 40)).unwrap();
        drop(tx);
        aggregator.run(rx).await;

        assert_eq!(snapshot.borrow().completed(0), 40);
    }
}
