//! SQLite persistence for the sync queue, dead letters and engine state.

mod model;
mod repository;

pub use model::{DeadLetterDB, NewDeadLetterDB, NewQueueEntryDB, QueueEntryDB, SyncEngineStateDB};
pub use repository::{count_record_mutations, write_queue_entry, SyncQueueRepository};
