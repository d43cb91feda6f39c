//! Versioned schema migrations.
//!
//! Migrations are applied strictly in ascending order, each in its own
//! transaction. Column additions are guarded by `PRAGMA table_info`, so a
//! database that already carries a column (for example one patched by an
//! older build) still migrates cleanly. A failing step is logged and skipped;
//! it never aborts initialization.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, info, warn};

use fieldsync_core::Result;

use crate::errors::StorageError;
use crate::schema::schema_version;

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// Raw statement(s). Expected to be idempotent (`IF NOT EXISTS`).
    Sql(&'static str),
    /// `ALTER TABLE .. ADD COLUMN`, skipped when the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub steps: Vec<MigrationStep>,
}

/// Outcome of one migration, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub version: i32,
    pub applied_steps: usize,
    pub skipped_steps: usize,
    pub failed_steps: usize,
}

pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "baseline",
            steps: vec![
                MigrationStep::Sql(
                    "CREATE TABLE IF NOT EXISTS consumer_indexing (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        consumer_id TEXT NOT NULL UNIQUE,
                        consumer_name TEXT,
                        father_name TEXT,
                        address TEXT,
                        mobile_number TEXT,
                        division TEXT,
                        sub_division TEXT,
                        section TEXT,
                        feeder_name TEXT,
                        dt_code TEXT,
                        pole_number TEXT,
                        meter_number TEXT,
                        meter_make TEXT,
                        sanctioned_load REAL,
                        tariff_category TEXT,
                        connection_type TEXT,
                        survey_meter_number TEXT,
                        meter_reading REAL,
                        meter_status TEXT,
                        premise_type TEXT,
                        occupancy_status TEXT,
                        remarks TEXT,
                        status TEXT NOT NULL DEFAULT 'assigned',
                        sync_status TEXT NOT NULL DEFAULT 'pending',
                        created_on TEXT NOT NULL,
                        modified_on TEXT NOT NULL,
                        created_by TEXT,
                        modified_by TEXT,
                        last_synced_on TEXT
                    )",
                ),
                MigrationStep::Sql(
                    "CREATE TABLE IF NOT EXISTS attachments (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        record_id INTEGER NOT NULL REFERENCES consumer_indexing(id) ON DELETE CASCADE,
                        attachment_type TEXT NOT NULL,
                        uri TEXT,
                        data BLOB,
                        mime_type TEXT,
                        size_bytes INTEGER,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL,
                        UNIQUE (record_id, attachment_type)
                    )",
                ),
                MigrationStep::Sql(
                    "CREATE TABLE IF NOT EXISTS dashboard_counters (
                        bucket TEXT PRIMARY KEY NOT NULL,
                        value INTEGER NOT NULL DEFAULT 0,
                        updated_at TEXT NOT NULL
                    )",
                ),
                MigrationStep::Sql(
                    "CREATE TABLE IF NOT EXISTS sync_queue (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        table_name TEXT NOT NULL,
                        record_id INTEGER NOT NULL,
                        action TEXT NOT NULL,
                        payload TEXT NOT NULL,
                        priority INTEGER NOT NULL DEFAULT 2,
                        retry_count INTEGER NOT NULL DEFAULT 0,
                        created_at TEXT NOT NULL
                    )",
                ),
                MigrationStep::Sql(
                    "CREATE INDEX IF NOT EXISTS idx_consumer_indexing_status
                        ON consumer_indexing (status, sync_status)",
                ),
            ],
        },
        Migration {
            version: 2,
            name: "capture_gps",
            steps: vec![
                MigrationStep::AddColumn {
                    table: "consumer_indexing",
                    column: "latitude",
                    definition: "REAL",
                },
                MigrationStep::AddColumn {
                    table: "consumer_indexing",
                    column: "longitude",
                    definition: "REAL",
                },
                MigrationStep::AddColumn {
                    table: "consumer_indexing",
                    column: "gps_accuracy",
                    definition: "REAL",
                },
            ],
        },
        Migration {
            version: 3,
            name: "capture_network",
            steps: vec![
                MigrationStep::AddColumn {
                    table: "consumer_indexing",
                    column: "network_type",
                    definition: "TEXT",
                },
                MigrationStep::AddColumn {
                    table: "consumer_indexing",
                    column: "network_strength",
                    definition: "TEXT",
                },
            ],
        },
        Migration {
            version: 4,
            name: "queue_and_upload_tracking",
            steps: vec![
                MigrationStep::AddColumn {
                    table: "sync_queue",
                    column: "last_error",
                    definition: "TEXT",
                },
                MigrationStep::Sql(
                    "CREATE INDEX IF NOT EXISTS idx_sync_queue_order
                        ON sync_queue (priority, created_at, id)",
                ),
                MigrationStep::Sql(
                    "CREATE INDEX IF NOT EXISTS idx_sync_queue_record
                        ON sync_queue (record_id, table_name)",
                ),
                MigrationStep::AddColumn {
                    table: "attachments",
                    column: "upload_status",
                    definition: "TEXT NOT NULL DEFAULT 'pending'",
                },
                MigrationStep::AddColumn {
                    table: "attachments",
                    column: "upload_attempts",
                    definition: "INTEGER NOT NULL DEFAULT 0",
                },
                MigrationStep::AddColumn {
                    table: "attachments",
                    column: "last_error",
                    definition: "TEXT",
                },
                MigrationStep::AddColumn {
                    table: "attachments",
                    column: "uploaded_at",
                    definition: "TEXT",
                },
            ],
        },
        Migration {
            version: 5,
            name: "engine_state_and_dead_letters",
            steps: vec![
                MigrationStep::Sql(
                    "CREATE TABLE IF NOT EXISTS sync_engine_state (
                        id INTEGER PRIMARY KEY NOT NULL CHECK (id = 1),
                        last_sync_at TEXT,
                        last_cycle_status TEXT,
                        last_synced_records INTEGER NOT NULL DEFAULT 0,
                        last_error_records INTEGER NOT NULL DEFAULT 0,
                        last_total_records INTEGER NOT NULL DEFAULT 0,
                        last_dropped_records INTEGER NOT NULL DEFAULT 0,
                        total_dropped_records INTEGER NOT NULL DEFAULT 0,
                        consecutive_failures INTEGER NOT NULL DEFAULT 0,
                        last_error TEXT,
                        last_cycle_duration_ms INTEGER
                    )",
                ),
                MigrationStep::Sql(
                    "CREATE TABLE IF NOT EXISTS sync_dead_letters (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        queue_entry_id INTEGER NOT NULL,
                        table_name TEXT NOT NULL,
                        record_id INTEGER NOT NULL,
                        action TEXT NOT NULL,
                        payload TEXT NOT NULL,
                        priority INTEGER NOT NULL,
                        retry_count INTEGER NOT NULL,
                        reason TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        dropped_at TEXT NOT NULL
                    )",
                ),
            ],
        },
        Migration {
            version: 6,
            name: "remote_snapshot_tracking",
            steps: vec![MigrationStep::AddColumn {
                table: "consumer_indexing",
                column: "remote_snapshot_at",
                definition: "TEXT",
            }],
        },
    ]
}

/// Version the schema reaches once every migration has been applied.
pub fn latest_version() -> i32 {
    all_migrations()
        .iter()
        .map(|migration| migration.version)
        .max()
        .unwrap_or(0)
}

#[derive(diesel::QueryableByName)]
struct PragmaTableInfoRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub(crate) fn load_table_columns(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", quote_identifier(table_name));
    let columns = diesel::sql_query(sql)
        .load::<PragmaTableInfoRow>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(|row| row.name)
        .collect();
    Ok(columns)
}

/// Creates the metadata table if missing. The singleton row only appears once
/// a version is stored, so a missing row reads as version 0 ("no schema yet").
pub fn ensure_version_table(conn: &mut SqliteConnection) -> Result<()> {
    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY NOT NULL CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
    .map_err(StorageError::from)?;
    Ok(())
}

pub fn current_version(conn: &mut SqliteConnection) -> Result<i32> {
    let version = schema_version::table
        .find(1)
        .select(schema_version::version)
        .first::<i32>(conn)
        .optional()
        .map_err(StorageError::from)?;
    Ok(version.unwrap_or(0))
}

/// Persists the schema version, creating the row on first use. Never moves it
/// backwards.
pub fn store_version(conn: &mut SqliteConnection, version: i32) -> Result<()> {
    let now = super::now_timestamp();
    let current = current_version(conn)?;
    if version <= current {
        return Ok(());
    }
    diesel::insert_into(schema_version::table)
        .values((
            schema_version::id.eq(1),
            schema_version::version.eq(version),
            schema_version::updated_at.eq(&now),
        ))
        .on_conflict(schema_version::id)
        .do_update()
        .set((
            schema_version::version.eq(version),
            schema_version::updated_at.eq(&now),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

/// Applies every migration above `from_version` in ascending order and
/// returns the version the schema now satisfies. Does not persist it.
pub fn apply_migrations(
    conn: &mut SqliteConnection,
    migrations: &[Migration],
    from_version: i32,
) -> Result<i32> {
    let mut ordered: Vec<&Migration> = migrations
        .iter()
        .filter(|migration| migration.version > from_version)
        .collect();
    ordered.sort_by_key(|migration| migration.version);

    let mut reached = from_version;
    for migration in ordered {
        let report = apply_migration(conn, migration)?;
        info!(
            "[Migrations] v{} '{}' applied={} skipped={} failed={}",
            migration.version,
            migration.name,
            report.applied_steps,
            report.skipped_steps,
            report.failed_steps
        );
        reached = migration.version;
    }
    Ok(reached)
}

pub fn apply_migration(
    conn: &mut SqliteConnection,
    migration: &Migration,
) -> Result<MigrationReport> {
    let report = conn.immediate_transaction::<MigrationReport, StorageError, _>(|conn| {
        let mut report = MigrationReport {
            version: migration.version,
            ..Default::default()
        };
        for step in &migration.steps {
            match apply_step(conn, step) {
                Ok(true) => report.applied_steps += 1,
                Ok(false) => report.skipped_steps += 1,
                Err(err) => {
                    warn!(
                        "[Migrations] v{} step failed and was skipped: {:?}: {}",
                        migration.version, step, err
                    );
                    report.failed_steps += 1;
                }
            }
        }
        Ok(report)
    })?;
    Ok(report)
}

/// Returns `Ok(false)` when the step had nothing to do.
fn apply_step(conn: &mut SqliteConnection, step: &MigrationStep) -> Result<bool> {
    match step {
        MigrationStep::Sql(sql) => {
            conn.batch_execute(sql).map_err(StorageError::from)?;
            Ok(true)
        }
        MigrationStep::AddColumn {
            table,
            column,
            definition,
        } => {
            let columns = load_table_columns(conn, table)?;
            if columns.iter().any(|existing| existing == column) {
                debug!(
                    "[Migrations] Column {}.{} already exists, skipping",
                    table, column
                );
                return Ok(false);
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_identifier(table),
                quote_identifier(column),
                definition
            );
            conn.batch_execute(&sql).map_err(StorageError::from)?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::Connection;

    fn memory_conn() -> SqliteConnection {
        SqliteConnection::establish(":memory:").expect("in-memory sqlite")
    }

    #[test]
    fn migrations_are_strictly_ascending() {
        let versions: Vec<i32> = all_migrations().iter().map(|m| m.version).collect();
        let expected: Vec<i32> = (1..=latest_version()).collect();
        assert_eq!(versions, expected);
    }

    #[test]
    fn fresh_database_reaches_latest_version() {
        let mut conn = memory_conn();
        ensure_version_table(&mut conn).unwrap();
        let reached = apply_migrations(&mut conn, &all_migrations(), 0).unwrap();
        assert_eq!(reached, latest_version());

        let columns = load_table_columns(&mut conn, "consumer_indexing").unwrap();
        for column in [
            "latitude",
            "longitude",
            "gps_accuracy",
            "network_type",
            "network_strength",
            "remote_snapshot_at",
        ] {
            assert!(columns.iter().any(|c| c == column), "missing {column}");
        }
        let columns = load_table_columns(&mut conn, "sync_queue").unwrap();
        assert!(columns.iter().any(|c| c == "last_error"));
    }

    #[test]
    fn existing_column_is_skipped_not_failed() {
        let mut conn = memory_conn();
        ensure_version_table(&mut conn).unwrap();
        apply_migrations(&mut conn, &all_migrations(), 0).unwrap();

        // Re-applying v2 over a schema that already has the columns.
        let v2 = all_migrations().into_iter().find(|m| m.version == 2).unwrap();
        let report = apply_migration(&mut conn, &v2).unwrap();
        assert_eq!(report.applied_steps, 0);
        assert_eq!(report.skipped_steps, 3);
        assert_eq!(report.failed_steps, 0);
    }

    #[test]
    fn failing_step_does_not_abort_the_migration() {
        let mut conn = memory_conn();
        let migration = Migration {
            version: 1,
            name: "partially_broken",
            steps: vec![
                MigrationStep::Sql("CREATE TABLE IF NOT EXISTS a (id INTEGER)"),
                MigrationStep::Sql("THIS IS NOT SQL"),
                MigrationStep::Sql("CREATE TABLE IF NOT EXISTS b (id INTEGER)"),
            ],
        };
        let report = apply_migration(&mut conn, &migration).unwrap();
        assert_eq!(report.applied_steps, 2);
        assert_eq!(report.failed_steps, 1);
        assert!(load_table_columns(&mut conn, "b").unwrap().contains(&"id".to_string()));
    }

    #[test]
    fn only_newer_migrations_run() {
        let mut conn = memory_conn();
        ensure_version_table(&mut conn).unwrap();
        apply_migrations(&mut conn, &all_migrations()[..1], 0).unwrap();

        let reached = apply_migrations(&mut conn, &all_migrations(), 1).unwrap();
        assert_eq!(reached, latest_version());
        // Stored version is untouched until the caller persists it.
        assert_eq!(current_version(&mut conn).unwrap(), 0);
    }

    #[test]
    fn version_row_is_created_at_the_first_stored_version() {
        let mut conn = memory_conn();
        ensure_version_table(&mut conn).unwrap();
        let rows = schema_version::table
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(current_version(&mut conn).unwrap(), 0);

        let reached = apply_migrations(&mut conn, &all_migrations(), 0).unwrap();
        store_version(&mut conn, reached).unwrap();
        let stored = schema_version::table
            .select(schema_version::version)
            .load::<i32>(&mut conn)
            .unwrap();
        assert_eq!(stored, vec![latest_version()]);
    }

    #[test]
    fn stored_version_never_decreases() {
        let mut conn = memory_conn();
        ensure_version_table(&mut conn).unwrap();
        store_version(&mut conn, 4).unwrap();
        store_version(&mut conn, 2).unwrap();
        assert_eq!(current_version(&mut conn).unwrap(), 4);
    }
}
