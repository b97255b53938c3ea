//! Background attachment-move retry worker (spec §7)
//!
//! When a submission's body is committed but one or more attachment moves
//! fail, the Submission Engine enqueues them here. This worker drains the
//! queue on an interval, retrying each move with bounded exponential
//! backoff; exhausted moves are logged for operator intervention but never
//! roll back the (already-immutable) submission.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eln_domain::entities::StagedFile;
use eln_domain::filename_codec;
use eln_ports::StorageAdapter;

#[derive(Debug, Clone)]
pub struct PendingMove {
    pub sop_id: String,
    pub owner_id: String,
    pub attachment: StagedFile,
    pub attempts: u32,
}

/// In-memory queue of attachment moves awaiting retry. Process-lifetime
/// only: a restart loses the queue, same as the source system's own
/// "operator intervention after exhaustion" fallback.
#[derive(Default)]
pub struct AttachmentRetryQueue {
    inner: Mutex<VecDeque<PendingMove>>,
}

impl AttachmentRetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, pending: PendingMove) {
        self.inner.lock().expect("retry queue mutex poisoned").push_back(pending);
    }

    fn drain(&self) -> Vec<PendingMove> {
        let mut guard = self.inner.lock().expect("retry queue mutex poisoned");
        guard.drain(..).collect()
    }

    fn requeue(&self, pending: PendingMove) {
        self.inner.lock().expect("retry queue mutex poisoned").push_back(pending);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("retry queue mutex poisoned").len()
    }
}

pub struct AttachmentRetryWorker<S: StorageAdapter> {
    storage: Arc<S>,
    queue: Arc<AttachmentRetryQueue>,
    draft_root: String,
    submission_root: String,
    max_attempts: u32,
    base_backoff: Duration,
    poll_interval: Duration,
}

impl<S: StorageAdapter + 'static> AttachmentRetryWorker<S> {
    pub fn new(
        storage: Arc<S>,
        queue: Arc<AttachmentRetryQueue>,
        draft_root: impl Into<String>,
        submission_root: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            queue,
            draft_root: draft_root.into(),
            submission_root: submission_root.into(),
            max_attempts: 6,
            base_backoff: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Run the retry loop until the process exits. Intended to be spawned
    /// once at startup: `tokio::spawn(worker.run())`.
    pub async fn run(self) {
        loop {
            let pending = self.queue.drain();
            if pending.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            for mut pending_move in pending {
                match self.attempt_move(&pending_move).await {
                    Ok(()) => {
                        tracing::info!(
                            sop_id = %pending_move.sop_id,
                            temp_id = %pending_move.attachment.temp_id,
                            "attachment move converged on retry"
                        );
                    }
                    Err(e) if pending_move.attempts + 1 >= self.max_attempts => {
                        tracing::error!(
                            error = %e,
                            sop_id = %pending_move.sop_id,
                            temp_id = %pending_move.attachment.temp_id,
                            "attachment move exhausted retries; operator intervention required"
                        );
                    }
                    Err(e) => {
                        pending_move.attempts += 1;
                        tracing::warn!(
                            error = %e,
                            sop_id = %pending_move.sop_id,
                            temp_id = %pending_move.attachment.temp_id,
                            attempt = pending_move.attempts,
                            "attachment move retry failed; backing off"
                        );
                        let backoff = self.base_backoff * 2u32.saturating_pow(pending_move.attempts);
                        tokio::time::sleep(backoff).await;
                        self.queue.requeue(pending_move);
                    }
                }
            }
        }
    }

    async fn attempt_move(&self, pending: &PendingMove) -> Result<(), eln_domain::errors::ElnError> {
        let stored_filename = filename_codec::encode_staged_file(
            &pending.owner_id,
            &pending.attachment.field_id,
            pending.attachment.temp_id.as_str(),
            &pending.attachment.original_name,
        );
        let src = format!("{}/{}/attachments/{}", self.draft_root, pending.sop_id, stored_filename);
        let dst = format!("{}/{}/attachments/{}", self.submission_root, pending.sop_id, stored_filename);
        self.storage.move_object(&src, &dst).await
    }
}
