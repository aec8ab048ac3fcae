use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{errors::YankError, plan::ChunkPlan, resume::ResumeStore, tracker::Tracker};

/// Flushes the tracker to the resume store once the session is cancelled.
///
/// The controller neither waits for nor stops workers: whatever the tracker
/// held when it was read is what the next run resumes from.
pub struct CancellationController<'a, S: ?Sized> {
    token: CancellationToken,
    store: &'a S,
    file_name: &'a str,
    /// Original plan, before any resume adjustment.
    plan: &'a ChunkPlan,
}

impl<'a, S: ResumeStore + ?Sized> CancellationController<'a, S> {
    pub fn new(
        token: CancellationToken,
        store: &'a S,
        file_name: &'a str,
        plan: &'a ChunkPlan,
    ) -> Self {
        CancellationController {
            token,
            store,
            file_name,
            plan,
        }
    }

    /// Waits for cancellation, then saves a snapshot of the tracker.
    pub async fn watch(self, snapshot: watch::Receiver<Tracker>) -> Result<(), YankError> {
        self.token.cancelled().await;
        warn!(file_name = self.file_name, "download interrupted, saving resume state");

        let tracker = snapshot.borrow().clone();
        self.store.save(&tracker, self.file_name, self.plan).await?;
        info!(
            file_name = self.file_name,
            completed = tracker.total(),
            "resume state saved"
        );
        Ok(())
    }
}
