//! Consumer survey records: models, repository contract and form service.

mod consumers_model;
mod consumers_service;
mod consumers_traits;

pub use consumers_model::*;
pub use consumers_service::*;
pub use consumers_traits::*;
