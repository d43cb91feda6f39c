use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use std::sync::Arc;

use fieldsync_core::consumers::{
    ConsumerRecord, ConsumerRepositoryTrait, NewConsumerRecord, RecordFilter, RecordStatus,
    SaveMode, SurveyUpdate, SyncStatus,
};
use fieldsync_core::sync::{NewQueueEntry, QueueAction, SyncRecordKind};
use fieldsync_core::{Error, Result};

use super::model::{ConsumerRecordDB, NewConsumerRecordDB, SurveyChangesetDB};
use crate::db::{enum_to_db, get_connection, now_timestamp, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{attachments, consumer_indexing, dashboard_counters, sync_dead_letters, sync_queue};
use crate::sync::{count_record_mutations, write_queue_entry};

pub struct ConsumerRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl ConsumerRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        ConsumerRepository { pool, writer }
    }
}

pub(crate) fn load_by_consumer_id(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<ConsumerRecord>> {
    consumer_indexing::table
        .filter(consumer_indexing::consumer_id.eq(key))
        .select(ConsumerRecordDB::as_select())
        .first::<ConsumerRecordDB>(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(ConsumerRecord::try_from)
        .transpose()
}

pub(crate) fn load_by_id(conn: &mut SqliteConnection, record_id: i64) -> Result<Option<ConsumerRecord>> {
    consumer_indexing::table
        .find(record_id)
        .select(ConsumerRecordDB::as_select())
        .first::<ConsumerRecordDB>(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(ConsumerRecord::try_from)
        .transpose()
}

/// Snapshot of the record as it is queued for the remote.
fn snapshot(record: &ConsumerRecord) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(record)?)
}

#[async_trait]
impl ConsumerRepositoryTrait for ConsumerRepository {
    fn get_by_id(&self, record_id: i64) -> Result<Option<ConsumerRecord>> {
        let mut conn = get_connection(&self.pool)?;
        load_by_id(&mut conn, record_id)
    }

    fn get_by_consumer_id(&self, consumer_id: &str) -> Result<Option<ConsumerRecord>> {
        let mut conn = get_connection(&self.pool)?;
        load_by_consumer_id(&mut conn, consumer_id)
    }

    fn query(
        &self,
        filter: &RecordFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConsumerRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = consumer_indexing::table.into_boxed();

        for (key, value) in &filter.0 {
            let value = value.clone();
            query = match key.as_str() {
                "consumer_id" => query.filter(consumer_indexing::consumer_id.eq(value)),
                "status" => query.filter(consumer_indexing::status.eq(value)),
                "sync_status" => query.filter(consumer_indexing::sync_status.eq(value)),
                "division" => query.filter(consumer_indexing::division.eq(value)),
                "sub_division" => query.filter(consumer_indexing::sub_division.eq(value)),
                "section" => query.filter(consumer_indexing::section.eq(value)),
                "feeder_name" => query.filter(consumer_indexing::feeder_name.eq(value)),
                "dt_code" => query.filter(consumer_indexing::dt_code.eq(value)),
                "meter_number" => query.filter(consumer_indexing::meter_number.eq(value)),
                "created_by" => query.filter(consumer_indexing::created_by.eq(value)),
                "modified_by" => query.filter(consumer_indexing::modified_by.eq(value)),
                "search" => {
                    let pattern = format!("%{}%", value.trim());
                    query.filter(
                        consumer_indexing::consumer_name
                            .like(pattern.clone())
                            .or(consumer_indexing::consumer_id.like(pattern.clone()))
                            .or(consumer_indexing::meter_number.like(pattern)),
                    )
                }
                other => {
                    debug!("[Consumers] Ignoring unknown filter key '{}'", other);
                    query
                }
            };
        }

        let rows = query
            .order(consumer_indexing::id.asc())
            .limit(limit)
            .offset(offset)
            .select(ConsumerRecordDB::as_select())
            .load::<ConsumerRecordDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(ConsumerRecord::try_from).collect()
    }

    async fn upsert_imported(&self, record: NewConsumerRecord) -> Result<i64> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<i64> {
                let now = now_timestamp();
                let row = NewConsumerRecordDB::from_domain(
                    record,
                    RecordStatus::Assigned,
                    SyncStatus::Synced,
                    &now,
                )?;
                let changes = row.imported_fields();
                let key = row.consumer_id.clone();

                diesel::insert_into(consumer_indexing::table)
                    .values(&row)
                    .on_conflict(consumer_indexing::consumer_id)
                    .do_update()
                    .set(&changes)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                let id = consumer_indexing::table
                    .filter(consumer_indexing::consumer_id.eq(&key))
                    .select(consumer_indexing::id)
                    .first::<i64>(conn)
                    .map_err(StorageError::from)?;
                Ok(id)
            })
            .await
    }

    async fn register_consumer(
        &self,
        record: NewConsumerRecord,
        user: String,
    ) -> Result<ConsumerRecord> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<ConsumerRecord> {
                let now = now_timestamp();
                let mut row = NewConsumerRecordDB::from_domain(
                    record,
                    RecordStatus::Assigned,
                    SyncStatus::Pending,
                    &now,
                )?;
                row.created_by = Some(user.clone());
                row.modified_by = Some(user);

                let saved = diesel::insert_into(consumer_indexing::table)
                    .values(&row)
                    .returning(ConsumerRecordDB::as_returning())
                    .get_result::<ConsumerRecordDB>(conn)
                    .map_err(StorageError::from)?;
                let saved = ConsumerRecord::try_from(saved)?;

                write_queue_entry(
                    conn,
                    NewQueueEntry::new(
                        SyncRecordKind::ConsumerIndexing,
                        saved.id,
                        QueueAction::Insert,
                        snapshot(&saved)?,
                    ),
                )?;
                Ok(saved)
            })
            .await
    }

    async fn save_survey(
        &self,
        consumer_id: String,
        update: SurveyUpdate,
        mode: SaveMode,
        user: String,
    ) -> Result<ConsumerRecord> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<ConsumerRecord> {
                let existing = load_by_consumer_id(conn, &consumer_id)?
                    .ok_or_else(|| Error::not_found(format!("Consumer '{}'", consumer_id)))?;
                let action = if existing.last_synced_on.is_none() {
                    QueueAction::Insert
                } else {
                    QueueAction::Update
                };

                let changes =
                    SurveyChangesetDB::new(update, mode.record_status(), user, now_timestamp())?;
                diesel::update(consumer_indexing::table.find(existing.id))
                    .set(&changes)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                let saved = load_by_id(conn, existing.id)?
                    .ok_or_else(|| Error::not_found(format!("Consumer '{}'", consumer_id)))?;
                let kind = match mode {
                    SaveMode::Draft => SyncRecordKind::ConsumerDraft,
                    SaveMode::ReadyToSync | SaveMode::Submit => SyncRecordKind::ConsumerIndexing,
                };
                write_queue_entry(
                    conn,
                    NewQueueEntry::new(kind, saved.id, action, snapshot(&saved)?),
                )?;
                Ok(saved)
            })
            .await
    }

    fn accepted_snapshot_at(&self, record_id: i64) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let accepted = consumer_indexing::table
            .find(record_id)
            .select(consumer_indexing::remote_snapshot_at)
            .first::<Option<String>>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .ok_or_else(|| Error::not_found(format!("Consumer record {}", record_id)))?;
        Ok(accepted)
    }

    async fn settle_sync_status(
        &self,
        record_id: i64,
        status: SyncStatus,
        accepted_snapshot_at: Option<String>,
    ) -> Result<bool> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let target = consumer_indexing::table.find(record_id);
                let exists = target
                    .select(consumer_indexing::id)
                    .first::<i64>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                if exists.is_none() {
                    return Err(Error::not_found(format!("Consumer record {}", record_id)));
                }

                if let Some(accepted) = accepted_snapshot_at {
                    diesel::update(
                        target.filter(
                            consumer_indexing::remote_snapshot_at
                                .is_null()
                                .or(consumer_indexing::remote_snapshot_at.lt(&accepted)),
                        ),
                    )
                    .set(consumer_indexing::remote_snapshot_at.eq(&accepted))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                }

                let queued = count_record_mutations(conn, record_id)?;
                if queued > 0 {
                    debug!(
                        "[Consumers] Record {} keeps its status: {} mutation(s) still queued",
                        record_id, queued
                    );
                    return Ok(false);
                }

                let value = enum_to_db(&status)?;
                let updated = if status == SyncStatus::Synced {
                    diesel::update(target)
                        .set((
                            consumer_indexing::sync_status.eq(value),
                            consumer_indexing::last_synced_on.eq(Some(now_timestamp())),
                        ))
                        .execute(conn)
                } else {
                    diesel::update(target)
                        .set(consumer_indexing::sync_status.eq(value))
                        .execute(conn)
                };
                updated.map_err(StorageError::from)?;
                Ok(true)
            })
            .await
    }

    async fn wipe_all(&self) -> Result<()> {
        self.writer
            .exec(|conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(attachments::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(sync_queue::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(sync_dead_letters::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(consumer_indexing::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::update(dashboard_counters::table)
                    .set((
                        dashboard_counters::value.eq(0_i64),
                        dashboard_counters::updated_at.eq(now_timestamp()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
