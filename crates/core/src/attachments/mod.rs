//! Photo attachments owned by consumer records.

mod attachments_model;
mod attachments_traits;

pub use attachments_model::*;
pub use attachments_traits::*;
