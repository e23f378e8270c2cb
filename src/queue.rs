//! Processing Queue: coalesces file-change notifications into the File
//! Metadata DB's `pending` state and wakes idle workers.
//!
//! Built on `async-channel` + the `tokio` multi-thread runtime. The channel
//! only carries wake-up hints, never the authoritative work item. The File
//! Metadata DB's `claim_next_pending`
//! (a single mutex-guarded SQL statement, see [`crate::metadata_db`]) is what
//! actually hands out "exactly one worker processes a given file at a time" —
//! the channel exists so idle workers block instead of busy-polling. A queue
//! with zero pending wake-up messages and a non-empty `pending` table is not a
//! bug: workers re-check on every wake and on a bounded idle timeout too.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RetryableError;
use crate::metadata_db::FileMetadataDb;

/// How long [`ProcessingQueue::wait_for_work_blocking`] parks between
/// `claim_next_pending` re-checks when no wake-up has arrived — this is what
/// lets a backoff-delayed retry get picked up again without a fresh `enqueue`.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Upper bound on how long one `wait_for_work_blocking` call parks before
/// returning control to the caller for a `claim_next_pending` re-check.
const IDLE_TIMEOUT: Duration = Duration::from_millis(250);

/// Wake-up hint sent to idle workers; carries no payload because the
/// authoritative work item always comes from `claim_next_pending`.
#[derive(Debug, Clone, Copy)]
pub struct WakeUp;

/// Coalesces enqueue requests into the durable file-state table and notifies
/// idle workers. Cheap to clone (all state lives behind `Arc`s).
#[derive(Clone)]
pub struct ProcessingQueue {
    metadata: Arc<FileMetadataDb>,
    max_retries: u32,
    wake_tx: async_channel::Sender<WakeUp>,
    wake_rx: async_channel::Receiver<WakeUp>,
}

impl ProcessingQueue {
    pub fn new(metadata: Arc<FileMetadataDb>, max_retries: u32) -> Self {
        // Bounded at the worker concurrency scale; a full channel just means
        // there is already a pending wake-up in flight, which is fine since
        // `claim_next_pending` is idempotent to call redundantly.
        let (wake_tx, wake_rx) = async_channel::bounded(256);
        Self { metadata, max_retries, wake_tx, wake_rx }
    }

    /// Enqueue `path` for processing. Coalesces with any existing row for the
    /// same path via the metadata DB's upsert (same hash => retry counters
    /// untouched; changed hash => retry counters reset).
    /// Returns the row's stable `fileId`.
    pub fn enqueue(&self, path: &str, hash: Option<&str>, size: u64) -> Result<String, RetryableError> {
        let file_id = self
            .metadata
            .insert_file(path, hash, size, self.max_retries)
            .map_err(RetryableError::Graph)?;
        // Best-effort: a full or closed channel never blocks enqueue, since
        // `claim_next_pending` remains the source of truth regardless.
        let _ = self.wake_tx.try_send(WakeUp);
        Ok(file_id)
    }

    /// Wait for a wake-up, or return immediately if one is already queued.
    /// Workers still re-poll on their own idle timeout in case a wake-up was
    /// dropped (full channel) while work was already pending.
    pub async fn wait_for_work(&self) {
        let _ = self.wake_rx.recv().await;
    }

    /// Blocking counterpart of [`Self::wait_for_work`], used by the Worker
    /// Pool's plain OS threads (the Orchestrator is `!Send`/`!Sync`, so
    /// workers cannot be `tokio` tasks; see [`crate::orchestrator::Orchestrator`]).
    /// Parks for at most [`IDLE_TIMEOUT`], polling every [`IDLE_POLL_INTERVAL`],
    /// so a file made eligible again only by backoff elapsing (no new
    /// `enqueue`, hence no fresh wake-up) still gets re-claimed. Returns
    /// `false` only once the channel is closed (graceful shutdown, all
    /// senders dropped) so the worker's loop condition can exit cleanly.
    pub fn wait_for_work_blocking(&self) -> bool {
        let deadline = Instant::now() + IDLE_TIMEOUT;
        loop {
            match self.wake_rx.try_recv() {
                Ok(_) => return true,
                Err(async_channel::TryRecvError::Closed) => return false,
                Err(async_channel::TryRecvError::Empty) => {
                    if Instant::now() >= deadline {
                        return true;
                    }
                    std::thread::sleep(IDLE_POLL_INTERVAL);
                }
            }
        }
    }

    /// Close the wake-up channel, unblocking every worker parked in
    /// [`Self::wait_for_work_blocking`], for graceful shutdown.
    pub fn close(&self) {
        self.wake_rx.close();
    }

    pub fn metadata(&self) -> &Arc<FileMetadataDb> {
        &self.metadata
    }
}
