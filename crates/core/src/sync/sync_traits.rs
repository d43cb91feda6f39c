use async_trait::async_trait;

use super::sync_model::{CycleOutcome, DeadLetter, NewQueueEntry, QueueEntry, SyncEngineStatus};
use crate::Result;

/// Durable intent log drained by the sync engine.
///
/// Entries are append-only: nothing but the engine removes them or bumps
/// their retry count.
#[async_trait]
pub trait SyncQueueRepositoryTrait: Send + Sync {
    /// Append a new entry. Never coalesces with existing entries.
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<i64>;

    /// Oldest, most urgent entries first: `(priority ASC, created_at ASC, id ASC)`.
    fn dequeue_batch(&self, limit: i64) -> Result<Vec<QueueEntry>>;

    async fn remove(&self, entry_id: i64) -> Result<()>;

    async fn increment_retry(&self, entry_id: i64, last_error: Option<String>) -> Result<()>;

    fn count(&self) -> Result<i64>;

    /// Entries still queued for the given record, across record-mutation kinds.
    fn count_pending_for_record(&self, record_id: i64) -> Result<i64>;

    /// Copy the entry into the dead-letter table and remove it, atomically.
    async fn dead_letter(&self, entry: QueueEntry, reason: String) -> Result<()>;

    fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>>;

    fn count_dead_letters(&self) -> Result<i64>;

    async fn record_cycle_outcome(&self, outcome: CycleOutcome) -> Result<()>;

    fn get_engine_status(&self) -> Result<SyncEngineStatus>;
}
