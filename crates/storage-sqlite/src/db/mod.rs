//! Database bootstrap: file location, pool, writer and the store lifecycle.

pub mod migrations;
pub mod write_actor;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use log::{info, warn};

use fieldsync_core::dashboard::COUNTER_BUCKETS;
use fieldsync_core::errors::{Error, Result};

use crate::errors::StorageError;
use crate::schema::{dashboard_counters, sync_engine_state};

pub use migrations::{all_migrations, apply_migrations, latest_version, Migration, MigrationStep};
pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const DB_FILE_NAME: &str = "fieldsync.db";
const POOL_MAX_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u32 = 5_000;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Ensures the data directory exists and returns the database file path.
pub fn init(app_data_dir: &str) -> Result<String> {
    std::fs::create_dir_all(app_data_dir).map_err(|err| {
        Error::StoreUnavailable(format!(
            "Cannot create data directory '{}': {}",
            app_data_dir, err
        ))
    })?;
    let db_path = Path::new(app_data_dir).join(DB_FILE_NAME);
    Ok(db_path.to_string_lossy().to_string())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(|err| Error::StoreUnavailable(format!("Cannot open '{}': {}", db_path, err)))?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

/// Brings the schema at `db_path` to the latest version and seeds the
/// baseline rows. Runs on a dedicated connection before any pool exists.
pub fn run_migrations(db_path: &str) -> Result<i32> {
    let mut conn = SqliteConnection::establish(db_path)
        .map_err(|err| Error::StoreUnavailable(format!("Cannot open '{}': {}", db_path, err)))?;
    conn.batch_execute(&format!("PRAGMA busy_timeout = {};", BUSY_TIMEOUT_MS))
        .map_err(StorageError::from)?;

    migrations::ensure_version_table(&mut conn)?;
    let from_version = migrations::current_version(&mut conn)?;
    let reached = migrations::apply_migrations(&mut conn, &all_migrations(), from_version)?;
    ensure_baseline_rows(&mut conn)?;
    migrations::store_version(&mut conn, reached)?;

    let version = migrations::current_version(&mut conn)?;
    if version != from_version {
        info!("[Store] Schema migrated from v{} to v{}", from_version, version);
    }
    Ok(version)
}

/// Zeroed counters and the engine-state singleton. Safe to call repeatedly.
fn ensure_baseline_rows(conn: &mut SqliteConnection) -> Result<()> {
    let now = now_timestamp();
    for bucket in COUNTER_BUCKETS {
        diesel::insert_or_ignore_into(dashboard_counters::table)
            .values((
                dashboard_counters::bucket.eq(bucket),
                dashboard_counters::value.eq(0_i64),
                dashboard_counters::updated_at.eq(&now),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
    }
    diesel::insert_or_ignore_into(sync_engine_state::table)
        .values(sync_engine_state::id.eq(1))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

struct OpenStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    schema_version: i32,
}

/// Lifecycle owner of the local database. Repositories can only be built
/// from an initialized store.
pub struct Store {
    app_data_dir: String,
    open: Mutex<Option<OpenStore>>,
}

impl Store {
    pub fn new(app_data_dir: impl Into<String>) -> Self {
        Self {
            app_data_dir: app_data_dir.into(),
            open: Mutex::new(None),
        }
    }

    /// Opens the database, runs pending migrations, seeds baseline rows and
    /// starts the writer. A second call is a no-op.
    pub fn initialize(&self) -> Result<i32> {
        let mut guard = self
            .open
            .lock()
            .map_err(|_| Error::StoreUnavailable("Store state lock poisoned".to_string()))?;
        if let Some(open) = guard.as_ref() {
            return Ok(open.schema_version);
        }

        let db_path = init(&self.app_data_dir)?;
        let schema_version = run_migrations(&db_path).map_err(|err| match err {
            Error::StoreUnavailable(_) => err,
            other => {
                warn!("[Store] Initialization failed: {}", other);
                Error::StoreUnavailable(other.to_string())
            }
        })?;
        let pool = create_pool(&db_path)?;
        let writer = spawn_writer(Arc::clone(&pool));

        info!(
            "[Store] Opened {} at schema v{}",
            db_path, schema_version
        );
        *guard = Some(OpenStore {
            pool,
            writer,
            schema_version,
        });
        Ok(schema_version)
    }

    pub fn is_initialized(&self) -> bool {
        self.open
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    pub fn pool(&self) -> Result<Arc<DbPool>> {
        self.with_open(|open| Arc::clone(&open.pool))
    }

    pub fn writer(&self) -> Result<WriteHandle> {
        self.with_open(|open| open.writer.clone())
    }

    pub fn schema_version(&self) -> Result<i32> {
        self.with_open(|open| open.schema_version)
    }

    fn with_open<T>(&self, read: impl FnOnce(&OpenStore) -> T) -> Result<T> {
        let guard = self
            .open
            .lock()
            .map_err(|_| Error::StoreUnavailable("Store state lock poisoned".to_string()))?;
        guard
            .as_ref()
            .map(read)
            .ok_or_else(|| Error::StoreUnavailable("Store has not been initialized".to_string()))
    }
}

/// UTC timestamp with a fixed width, so lexical order matches time order.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Serializes a unit enum the way serde names it (`"to_sync"` -> `to_sync`).
pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::consumers::RecordStatus;
    use tempfile::tempdir;

    #[derive(diesel::QueryableByName)]
    struct CountRow {
        #[diesel(sql_type = diesel::sql_types::BigInt)]
        c: i64,
    }

    fn count(pool: &DbPool, sql: &str) -> i64 {
        let mut conn = get_connection(pool).expect("conn");
        diesel::sql_query(sql)
            .get_result::<CountRow>(&mut conn)
            .expect("count")
            .c
    }

    #[test]
    fn store_is_unavailable_before_initialize() {
        let dir = tempdir().expect("tempdir");
        let store = Store::new(dir.path().to_string_lossy().to_string());
        assert!(matches!(store.pool(), Err(Error::StoreUnavailable(_))));
        assert!(matches!(store.writer(), Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = Store::new(dir.path().to_string_lossy().to_string());
        let first = store.initialize().expect("init");
        let second = store.initialize().expect("init again");
        assert_eq!(first, latest_version());
        assert_eq!(first, second);

        // A fresh store over the same file sees no duplicated baseline rows.
        let reopened = Store::new(dir.path().to_string_lossy().to_string());
        assert_eq!(reopened.initialize().expect("reopen"), first);
        let pool = reopened.pool().expect("pool");
        assert_eq!(
            count(&pool, "SELECT COUNT(*) AS c FROM dashboard_counters"),
            COUNTER_BUCKETS.len() as i64
        );
        assert_eq!(count(&pool, "SELECT COUNT(*) AS c FROM sync_engine_state"), 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) AS c FROM schema_version"), 1);
    }

    #[test]
    fn unusable_directory_is_store_unavailable() {
        let dir = tempdir().expect("tempdir");
        let file_path = dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"x").expect("write file");
        let store = Store::new(file_path.join("nested").to_string_lossy().to_string());
        assert!(matches!(store.initialize(), Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn legacy_database_with_existing_columns_still_initializes() {
        let dir = tempdir().expect("tempdir");
        let app_dir = dir.path().to_string_lossy().to_string();
        let db_path = init(&app_dir).expect("init");
        {
            // An older build created the table with the GPS columns and never
            // recorded a schema version.
            let mut conn = SqliteConnection::establish(&db_path).expect("conn");
            conn.batch_execute(
                "CREATE TABLE consumer_indexing (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    consumer_id TEXT NOT NULL UNIQUE,
                    status TEXT NOT NULL DEFAULT 'assigned',
                    sync_status TEXT NOT NULL DEFAULT 'pending',
                    created_on TEXT NOT NULL,
                    modified_on TEXT NOT NULL,
                    latitude REAL,
                    longitude REAL
                );",
            )
            .expect("legacy schema");
        }

        let version = run_migrations(&db_path).expect("migrate legacy db");
        assert_eq!(version, latest_version());

        let mut conn = SqliteConnection::establish(&db_path).expect("conn");
        let columns = migrations::load_table_columns(&mut conn, "consumer_indexing").unwrap();
        assert!(columns.iter().any(|c| c == "gps_accuracy"));
        assert!(columns.iter().any(|c| c == "network_type"));
    }

    #[test]
    fn enum_helpers_use_serde_names() {
        assert_eq!(enum_to_db(&RecordStatus::ToSync).unwrap(), "to_sync");
        let status: RecordStatus = enum_from_db("completed").unwrap();
        assert_eq!(status, RecordStatus::Completed);
    }
}
