//! SQLite storage for FieldSync.
//!
//! Implements the repository traits from `fieldsync-core` on top of diesel
//! and an r2d2 pool. Reads go through the pool; every write is funneled
//! through the single writer actor in [`db::write_actor`], which is also what
//! lets a record write and its queue entry commit together.

pub mod attachments;
pub mod consumers;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod schema;
pub mod sync;

pub use attachments::AttachmentRepository;
pub use consumers::ConsumerRepository;
pub use dashboard::DashboardRepository;
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool, Store,
    WriteHandle,
};
pub use errors::StorageError;
pub use sync::{write_queue_entry, SyncQueueRepository};
