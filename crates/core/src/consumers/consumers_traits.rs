use async_trait::async_trait;

use super::consumers_model::{
    ConsumerRecord, NewConsumerRecord, RecordFilter, SaveMode, SurveyUpdate, SyncStatus,
};
use crate::Result;

/// Persistence contract for consumer survey records.
///
/// Every write that users make through the forms also appends the matching
/// sync queue entry inside the same transaction, so a record can never be
/// saved without its queued snapshot (or the other way around).
#[async_trait]
pub trait ConsumerRepositoryTrait: Send + Sync {
    fn get_by_id(&self, record_id: i64) -> Result<Option<ConsumerRecord>>;

    fn get_by_consumer_id(&self, consumer_id: &str) -> Result<Option<ConsumerRecord>>;

    /// Filtered, paginated read ordered by local id. Unknown filter keys are ignored.
    fn query(&self, filter: &RecordFilter, limit: i64, offset: i64)
        -> Result<Vec<ConsumerRecord>>;

    /// Insert-or-replace an assigned consumer by business key. The local id
    /// is stable across replaces. No queue entry is written: the remote
    /// already knows imported consumers.
    async fn upsert_imported(&self, record: NewConsumerRecord) -> Result<i64>;

    /// Create a consumer discovered in the field and queue an `INSERT`.
    async fn register_consumer(
        &self,
        record: NewConsumerRecord,
        user: String,
    ) -> Result<ConsumerRecord>;

    /// Apply survey edits and queue a snapshot: drafts go to the draft queue
    /// table, ready/submitted saves to the indexing table. The action is
    /// `INSERT` until the remote knows the record (imported, or synced once),
    /// `UPDATE` afterwards.
    async fn save_survey(
        &self,
        consumer_id: String,
        update: SurveyUpdate,
        mode: SaveMode,
        user: String,
    ) -> Result<ConsumerRecord>;

    /// Queue timestamp of the newest record snapshot the remote has accepted.
    fn accepted_snapshot_at(&self, record_id: i64) -> Result<Option<String>>;

    /// Settles the record's sync status after the engine is done with one of
    /// its entries. `accepted_snapshot_at` (the queue timestamp of a snapshot
    /// the remote just accepted) is kept when newer than the stored one. The
    /// status is only written when no record mutation for it is still queued;
    /// the check and the write share one transaction. Returns whether the
    /// status was written. `Synced` also stamps `last_synced_on`.
    async fn settle_sync_status(
        &self,
        record_id: i64,
        status: SyncStatus,
        accepted_snapshot_at: Option<String>,
    ) -> Result<bool>;

    /// Explicit wipe of every record, attachment, queue entry and counter.
    async fn wipe_all(&self) -> Result<()>;
}
