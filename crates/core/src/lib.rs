//! Core library for FieldSync.
//!
//! Domain models for consumer surveys and their photo attachments, the
//! repository contracts implemented by the storage crate, and the offline
//! sync engine that drains the local queue towards the remote API.
//!
//! Nothing in this crate performs I/O on its own: storage, the remote
//! gateway and the network monitor are injected as trait objects by the
//! composition root.

pub mod attachments;
pub mod consumers;
pub mod dashboard;
pub mod errors;
pub mod sync;

pub use errors::{Error, Result};
