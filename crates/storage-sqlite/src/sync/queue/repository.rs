//! Repository for the durable sync queue and engine bookkeeping.

use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use fieldsync_core::errors::Result;
use fieldsync_core::sync::{
    record_mutation_tables, CycleOutcome, DeadLetter, NewQueueEntry, QueueEntry,
    SyncEngineStatus, SyncQueueRepositoryTrait,
};

use crate::db::{get_connection, now_timestamp, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{sync_dead_letters, sync_engine_state, sync_queue};

use super::model::{DeadLetterDB, NewDeadLetterDB, NewQueueEntryDB, QueueEntryDB, SyncEngineStateDB};

/// Appends a queue entry on an open write transaction. Record repositories
/// call this inside the same `writer.exec` that mutates the record.
pub fn write_queue_entry(conn: &mut SqliteConnection, entry: NewQueueEntry) -> Result<i64> {
    let row = NewQueueEntryDB {
        table_name: entry.table_name,
        record_id: entry.record_id,
        action: entry.action.as_str().to_string(),
        payload: serde_json::to_string(&entry.payload)?,
        priority: entry.priority,
        retry_count: 0,
        created_at: now_timestamp(),
    };

    let id = diesel::insert_into(sync_queue::table)
        .values(&row)
        .returning(sync_queue::id)
        .get_result::<i64>(conn)
        .map_err(StorageError::from)?;
    Ok(id)
}

/// Queued record mutations for one record. Usable inside a write transaction.
pub fn count_record_mutations(conn: &mut SqliteConnection, record_id: i64) -> Result<i64> {
    Ok(sync_queue::table
        .filter(sync_queue::record_id.eq(record_id))
        .filter(sync_queue::table_name.eq_any(record_mutation_tables()))
        .select(count_star())
        .first::<i64>(conn)
        .map_err(StorageError::from)?)
}

fn count_queue(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(sync_queue::table
        .select(count_star())
        .first::<i64>(conn)
        .map_err(StorageError::from)?)
}

fn count_dead_letters(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(sync_dead_letters::table
        .select(count_star())
        .first::<i64>(conn)
        .map_err(StorageError::from)?)
}

pub struct SyncQueueRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncQueueRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncQueueRepositoryTrait for SyncQueueRepository {
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<i64> {
        self.writer
            .exec(move |conn| write_queue_entry(conn, entry))
            .await
    }

    fn dequeue_batch(&self, limit: i64) -> Result<Vec<QueueEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .order((
                sync_queue::priority.asc(),
                sync_queue::created_at.asc(),
                sync_queue::id.asc(),
            ))
            .limit(limit.max(0))
            .select(QueueEntryDB::as_select())
            .load::<QueueEntryDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(QueueEntry::from).collect())
    }

    async fn remove(&self, entry_id: i64) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(sync_queue::table.find(entry_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn increment_retry(&self, entry_id: i64, last_error: Option<String>) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(sync_queue::table.find(entry_id))
                    .set((
                        sync_queue::retry_count.eq(sync_queue::retry_count + 1),
                        sync_queue::last_error.eq(last_error),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        count_queue(&mut conn)
    }

    fn count_pending_for_record(&self, record_id: i64) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        count_record_mutations(&mut conn, record_id)
    }

    async fn dead_letter(&self, entry: QueueEntry, reason: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = NewDeadLetterDB {
                    queue_entry_id: entry.id,
                    table_name: entry.table_name,
                    record_id: entry.record_id,
                    action: entry.action,
                    payload: entry.payload,
                    priority: entry.priority,
                    retry_count: entry.retry_count,
                    reason,
                    created_at: entry.created_at,
                    dropped_at: now_timestamp(),
                };
                diesel::insert_into(sync_dead_letters::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(sync_queue::table.find(entry.id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_dead_letters::table
            .order(sync_dead_letters::id.desc())
            .limit(limit.max(0))
            .select(DeadLetterDB::as_select())
            .load::<DeadLetterDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(DeadLetter::from).collect())
    }

    fn count_dead_letters(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        count_dead_letters(&mut conn)
    }

    async fn record_cycle_outcome(&self, outcome: CycleOutcome) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::insert_or_ignore_into(sync_engine_state::table)
                    .values(sync_engine_state::id.eq(1))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                let current = sync_engine_state::table
                    .find(1)
                    .select(SyncEngineStateDB::as_select())
                    .first::<SyncEngineStateDB>(conn)
                    .map_err(StorageError::from)?;

                let summary = &outcome.summary;
                let failed_cycle = !summary.success
                    || (summary.synced_records == 0 && summary.error_records > 0);
                let consecutive_failures = if summary.skipped_offline {
                    current.consecutive_failures
                } else if failed_cycle {
                    current.consecutive_failures.saturating_add(1)
                } else {
                    0
                };
                let last_sync_at = if summary.success && !summary.skipped_offline {
                    Some(now_timestamp())
                } else {
                    current.last_sync_at
                };
                let last_error = if summary.success && summary.error_records == 0 {
                    None
                } else {
                    summary.message.clone().or(current.last_error)
                };
                let dropped = summary.dropped_records as i64;

                diesel::update(sync_engine_state::table.find(1))
                    .set((
                        sync_engine_state::last_sync_at.eq(last_sync_at),
                        sync_engine_state::last_cycle_status.eq(Some(outcome.status.clone())),
                        sync_engine_state::last_synced_records.eq(summary.synced_records as i64),
                        sync_engine_state::last_error_records.eq(summary.error_records as i64),
                        sync_engine_state::last_total_records.eq(summary.total_records as i64),
                        sync_engine_state::last_dropped_records.eq(dropped),
                        sync_engine_state::total_dropped_records
                            .eq(current.total_dropped_records.saturating_add(dropped)),
                        sync_engine_state::consecutive_failures.eq(consecutive_failures),
                        sync_engine_state::last_error.eq(last_error),
                        sync_engine_state::last_cycle_duration_ms.eq(Some(outcome.duration_ms)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        let mut conn = get_connection(&self.pool)?;
        let engine = sync_engine_state::table
            .find(1)
            .select(SyncEngineStateDB::as_select())
            .first::<SyncEngineStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .unwrap_or_default();

        Ok(SyncEngineStatus {
            last_sync_at: engine.last_sync_at,
            last_cycle_status: engine.last_cycle_status,
            last_synced_records: engine.last_synced_records,
            last_error_records: engine.last_error_records,
            last_total_records: engine.last_total_records,
            last_dropped_records: engine.last_dropped_records,
            total_dropped_records: engine.total_dropped_records,
            consecutive_failures: engine.consecutive_failures,
            last_error: engine.last_error,
            last_cycle_duration_ms: engine.last_cycle_duration_ms,
            pending_entries: count_queue(&mut conn)?,
            dead_letters: count_dead_letters(&mut conn)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::sync::{QueueAction, SyncRecordKind, SyncSummary};
    use serde_json::json;
    use tempfile::tempdir;

    use crate::db::Store;

    fn setup() -> (tempfile::TempDir, SyncQueueRepository) {
        let dir = tempdir().expect("tempdir");
        let store = Store::new(dir.path().to_string_lossy().to_string());
        store.initialize().expect("init store");
        let repo = SyncQueueRepository::new(store.pool().unwrap(), store.writer().unwrap());
        (dir, repo)
    }

    fn entry(kind: SyncRecordKind, record_id: i64) -> NewQueueEntry {
        NewQueueEntry::new(
            kind,
            record_id,
            QueueAction::Insert,
            json!({ "consumerId": format!("C-{record_id}") }),
        )
    }

    #[tokio::test]
    async fn dequeue_orders_by_priority_then_age() {
        let (_dir, repo) = setup();
        let capture = repo.enqueue(entry(SyncRecordKind::Capture, 1)).await.unwrap();
        let draft_a = repo.enqueue(entry(SyncRecordKind::ConsumerDraft, 2)).await.unwrap();
        let identity = repo.enqueue(entry(SyncRecordKind::ConsumerIndexing, 3)).await.unwrap();
        let draft_b = repo.enqueue(entry(SyncRecordKind::ConsumerDraft, 4)).await.unwrap();

        let ids: Vec<i64> = repo.dequeue_batch(10).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![identity, draft_a, draft_b, capture]);

        let limited = repo.dequeue_batch(2).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn enqueue_never_coalesces() {
        let (_dir, repo) = setup();
        repo.enqueue(entry(SyncRecordKind::ConsumerIndexing, 1)).await.unwrap();
        repo.enqueue(entry(SyncRecordKind::ConsumerIndexing, 1)).await.unwrap();
        assert_eq!(repo.count().unwrap(), 2);
        assert_eq!(repo.count_pending_for_record(1).unwrap(), 2);
    }

    #[tokio::test]
    async fn captures_do_not_count_as_pending_record_mutations() {
        let (_dir, repo) = setup();
        repo.enqueue(entry(SyncRecordKind::Capture, 1)).await.unwrap();
        assert_eq!(repo.count_pending_for_record(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_retry_and_remove() {
        let (_dir, repo) = setup();
        let id = repo.enqueue(entry(SyncRecordKind::ConsumerIndexing, 1)).await.unwrap();
        repo.increment_retry(id, Some("status 503".to_string())).await.unwrap();
        repo.increment_retry(id, Some("status 0: timeout".to_string())).await.unwrap();

        let stored = &repo.dequeue_batch(1).unwrap()[0];
        assert_eq!(stored.retry_count, 2);
        assert_eq!(stored.last_error.as_deref(), Some("status 0: timeout"));
        assert_eq!(stored.payload, r#"{"consumerId":"C-1"}"#);

        repo.remove(id).await.unwrap();
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn dead_letter_moves_entry_atomically() {
        let (_dir, repo) = setup();
        repo.enqueue(entry(SyncRecordKind::ConsumerIndexing, 1)).await.unwrap();
        let queued = repo.dequeue_batch(1).unwrap().remove(0);

        repo.dead_letter(queued.clone(), "retry_ceiling_exceeded: status 500".to_string())
            .await
            .unwrap();

        assert_eq!(repo.count().unwrap(), 0);
        let dead = repo.list_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].queue_entry_id, queued.id);
        assert_eq!(dead[0].payload, queued.payload);
        assert_eq!(repo.count_dead_letters().unwrap(), 1);
    }

    #[tokio::test]
    async fn write_rollback_discards_queue_entry() {
        let (_dir, repo) = setup();
        let result: Result<()> = repo
            .writer
            .exec(|conn| {
                write_queue_entry(conn, entry(SyncRecordKind::ConsumerIndexing, 1))?;
                Err(fieldsync_core::Error::Unexpected("abort".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn cycle_outcomes_accumulate_engine_state() {
        let (_dir, repo) = setup();
        let partial = SyncSummary {
            success: true,
            synced_records: 0,
            error_records: 2,
            total_records: 2,
            dropped_records: 1,
            ..Default::default()
        };
        for _ in 0..2 {
            repo.record_cycle_outcome(CycleOutcome {
                status: partial.cycle_status().to_string(),
                summary: partial.clone(),
                duration_ms: 12,
            })
            .await
            .unwrap();
        }

        let status = repo.get_engine_status().unwrap();
        assert_eq!(status.last_cycle_status.as_deref(), Some("partial"));
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.total_dropped_records, 2);
        assert_eq!(status.last_cycle_duration_ms, Some(12));

        let ok = SyncSummary {
            success: true,
            synced_records: 3,
            total_records: 3,
            ..Default::default()
        };
        repo.record_cycle_outcome(CycleOutcome {
            status: ok.cycle_status().to_string(),
            summary: ok,
            duration_ms: 5,
        })
        .await
        .unwrap();

        let status = repo.get_engine_status().unwrap();
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_sync_at.is_some());
        assert_eq!(status.last_synced_records, 3);
    }
}
