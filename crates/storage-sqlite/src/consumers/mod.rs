//! SQLite persistence for consumer survey records.

mod model;
mod repository;

pub use model::{ConsumerRecordDB, ImportedFieldsDB, NewConsumerRecordDB, SurveyChangesetDB};
pub use repository::ConsumerRepository;
pub(crate) use repository::load_by_id;
