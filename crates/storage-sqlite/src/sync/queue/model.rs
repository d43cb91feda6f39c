//! Database models for the sync queue tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldsync_core::sync::{DeadLetter, QueueEntry};

#[derive(Queryable, Identifiable, Selectable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueueEntryDB {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub action: String,
    pub payload: String,
    pub priority: i32,
    pub retry_count: i32,
    pub created_at: String,
    pub last_error: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_queue)]
pub struct NewQueueEntryDB {
    pub table_name: String,
    pub record_id: i64,
    pub action: String,
    pub payload: String,
    pub priority: i32,
    pub retry_count: i32,
    pub created_at: String,
}

impl From<QueueEntryDB> for QueueEntry {
    fn from(row: QueueEntryDB) -> Self {
        Self {
            id: row.id,
            table_name: row.table_name,
            record_id: row.record_id,
            action: row.action,
            payload: row.payload,
            priority: row.priority,
            retry_count: row.retry_count,
            last_error: row.last_error,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_dead_letters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeadLetterDB {
    pub id: i64,
    pub queue_entry_id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub action: String,
    pub payload: String,
    pub priority: i32,
    pub retry_count: i32,
    pub reason: String,
    pub created_at: String,
    pub dropped_at: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_dead_letters)]
pub struct NewDeadLetterDB {
    pub queue_entry_id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub action: String,
    pub payload: String,
    pub priority: i32,
    pub retry_count: i32,
    pub reason: String,
    pub created_at: String,
    pub dropped_at: String,
}

impl From<DeadLetterDB> for DeadLetter {
    fn from(row: DeadLetterDB) -> Self {
        Self {
            id: row.id,
            queue_entry_id: row.queue_entry_id,
            table_name: row.table_name,
            record_id: row.record_id,
            action: row.action,
            payload: row.payload,
            priority: row.priority,
            retry_count: row.retry_count,
            reason: row.reason,
            created_at: row.created_at,
            dropped_at: row.dropped_at,
        }
    }
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::sync_engine_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncEngineStateDB {
    pub id: i32,
    pub last_sync_at: Option<String>,
    pub last_cycle_status: Option<String>,
    pub last_synced_records: i64,
    pub last_error_records: i64,
    pub last_total_records: i64,
    pub last_dropped_records: i64,
    pub total_dropped_records: i64,
    pub consecutive_failures: i32,
    pub last_error: Option<String>,
    pub last_cycle_duration_ms: Option<i64>,
}
