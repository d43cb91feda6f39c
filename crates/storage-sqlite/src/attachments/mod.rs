//! SQLite persistence for photo attachments.

mod model;
mod repository;

pub use model::{AttachmentDB, AttachmentReplaceDB, CaptureMergeDB, NewAttachmentDB};
pub use repository::AttachmentRepository;
