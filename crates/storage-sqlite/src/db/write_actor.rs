//! Single-writer actor.
//!
//! Every write runs on one dedicated thread inside an `IMMEDIATE`
//! transaction, so SQLite never sees two competing writers and a record
//! write commits together with the queue entry it produces.

use std::sync::Arc;
use std::thread;

use diesel::sqlite::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use fieldsync_core::errors::{DatabaseError, Error, Result};

use super::{get_connection, DbPool};
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&DbPool) + Send + 'static>;

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl WriteHandle {
    /// Runs `job` inside a write transaction on the writer thread. An error
    /// returned by the job rolls the whole transaction back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: Job = Box::new(move |pool: &DbPool| {
            let _ = reply_tx.send(run_in_transaction(pool, job));
        });

        self.tx.send(wrapped).map_err(|_| {
            Error::Database(DatabaseError::WriterUnavailable(
                "Writer thread has stopped".to_string(),
            ))
        })?;

        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::WriterUnavailable(
                "Writer dropped the job without replying".to_string(),
            ))
        })?
    }
}

fn run_in_transaction<F, T>(pool: &DbPool, job: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T>,
{
    let mut conn = get_connection(pool)?;
    conn.immediate_transaction::<T, StorageError, _>(|conn| job(conn).map_err(StorageError::from))
        .map_err(Error::from)
}

/// Starts the writer thread. It exits once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: Arc<DbPool>) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = thread::Builder::new()
        .name("fieldsync-writer".to_string())
        .spawn(move || {
            debug!("[Store] Writer thread started");
            while let Some(job) = rx.blocking_recv() {
                job(pool.as_ref());
            }
            debug!("[Store] Writer thread stopped");
        });

    if let Err(err) = spawned {
        // The receiver died with the closure, so every exec reports WriterUnavailable.
        error!("[Store] Failed to start writer thread: {}", err);
    }

    WriteHandle { tx }
}
