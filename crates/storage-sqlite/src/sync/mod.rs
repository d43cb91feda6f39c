//! SQLite storage for the offline sync queue.

pub mod queue;

pub use queue::{count_record_mutations, write_queue_entry, SyncQueueRepository};
