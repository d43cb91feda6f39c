use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::SqliteConnection;
use std::sync::Arc;

use fieldsync_core::consumers::{RecordStatus, SyncStatus};
use fieldsync_core::dashboard::{DashboardCounters, DashboardRepositoryTrait};
use fieldsync_core::Result;

use crate::db::{enum_from_db, get_connection, now_timestamp, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{consumer_indexing, dashboard_counters};

pub struct DashboardRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl DashboardRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        DashboardRepository { pool, writer }
    }
}

fn compute_counters(conn: &mut SqliteConnection) -> Result<DashboardCounters> {
    let mut counters = DashboardCounters::default();

    let by_status = consumer_indexing::table
        .group_by(consumer_indexing::status)
        .select((consumer_indexing::status, count_star()))
        .load::<(String, i64)>(conn)
        .map_err(StorageError::from)?;
    for (status, count) in by_status {
        counters.total += count;
        match enum_from_db::<RecordStatus>(&status) {
            Ok(RecordStatus::Assigned) => counters.assigned += count,
            Ok(RecordStatus::Draft) => counters.draft += count,
            Ok(RecordStatus::ToSync) => counters.to_sync += count,
            Ok(RecordStatus::Completed) => counters.completed += count,
            Err(_) => log::debug!("[Dashboard] Unknown record status '{}'", status),
        }
    }

    let by_sync = consumer_indexing::table
        .group_by(consumer_indexing::sync_status)
        .select((consumer_indexing::sync_status, count_star()))
        .load::<(String, i64)>(conn)
        .map_err(StorageError::from)?;
    for (status, count) in by_sync {
        match enum_from_db::<SyncStatus>(&status) {
            Ok(SyncStatus::Pending) => counters.sync_pending += count,
            Ok(SyncStatus::Synced) => counters.synced += count,
            Ok(SyncStatus::Failed) => counters.sync_failed += count,
            Err(_) => log::debug!("[Dashboard] Unknown sync status '{}'", status),
        }
    }
    Ok(counters)
}

#[async_trait]
impl DashboardRepositoryTrait for DashboardRepository {
    fn get_counters(&self) -> Result<DashboardCounters> {
        let mut conn = get_connection(&self.pool)?;
        let rows = dashboard_counters::table
            .select((
                dashboard_counters::bucket,
                dashboard_counters::value,
                dashboard_counters::updated_at,
            ))
            .load::<(String, i64, String)>(&mut conn)
            .map_err(StorageError::from)?;

        let mut counters = DashboardCounters::default();
        for (bucket, value, updated_at) in rows {
            counters.set_bucket(&bucket, value);
            if counters.updated_at.as_deref() < Some(updated_at.as_str()) {
                counters.updated_at = Some(updated_at);
            }
        }
        Ok(counters)
    }

    async fn rebuild_counters(&self) -> Result<DashboardCounters> {
        self.writer
            .exec(|conn: &mut SqliteConnection| -> Result<DashboardCounters> {
                let mut counters = compute_counters(conn)?;
                let now = now_timestamp();
                for (bucket, value) in counters.buckets() {
                    diesel::insert_into(dashboard_counters::table)
                        .values((
                            dashboard_counters::bucket.eq(bucket),
                            dashboard_counters::value.eq(value),
                            dashboard_counters::updated_at.eq(&now),
                        ))
                        .on_conflict(dashboard_counters::bucket)
                        .do_update()
                        .set((
                            dashboard_counters::value.eq(value),
                            dashboard_counters::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                counters.updated_at = Some(now);
                Ok(counters)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::ConsumerRepository;
    use crate::db::Store;
    use fieldsync_core::consumers::{ConsumerRepositoryTrait, NewConsumerRecord, SaveMode, SurveyUpdate};
    use tempfile::tempdir;

    #[tokio::test]
    async fn counters_are_stale_until_rebuilt() {
        let dir = tempdir().expect("tempdir");
        let store = Store::new(dir.path().to_string_lossy().to_string());
        store.initialize().expect("init store");
        let pool = store.pool().unwrap();
        let writer = store.writer().unwrap();
        let consumers = ConsumerRepository::new(Arc::clone(&pool), writer.clone());
        let dashboard = DashboardRepository::new(pool, writer);

        for key in ["C-1", "C-2", "C-3"] {
            consumers
                .upsert_imported(NewConsumerRecord {
                    consumer_id: key.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        consumers
            .save_survey("C-2".into(), SurveyUpdate::default(), SaveMode::Draft, "u".into())
            .await
            .unwrap();

        assert_eq!(dashboard.get_counters().unwrap().total, 0);

        let rebuilt = dashboard.rebuild_counters().await.unwrap();
        assert_eq!(rebuilt.total, 3);
        assert_eq!(rebuilt.assigned, 2);
        assert_eq!(rebuilt.draft, 1);
        assert_eq!(rebuilt.synced, 2);
        assert_eq!(rebuilt.sync_pending, 1);

        let persisted = dashboard.get_counters().unwrap();
        assert_eq!(persisted.total, 3);
        assert_eq!(persisted.draft, 1);
        assert!(persisted.updated_at.is_some());
    }
}
