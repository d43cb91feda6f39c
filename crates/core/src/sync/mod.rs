//! Sync queue models, remote contracts and the sync engine.

mod gateway;
mod network;
mod sync_config;
mod sync_engine;
mod sync_model;
mod sync_scheduler;
mod sync_service;
mod sync_traits;
mod translator;

pub use gateway::*;
pub use network::*;
pub use sync_config::*;
pub use sync_engine::*;
pub use sync_model::*;
pub use sync_scheduler::PeriodicSyncHandle;
pub use sync_scheduler::PERIODIC_SYNC_STARTUP_DELAY_SECS;
pub use sync_service::*;
pub use sync_traits::*;
pub use translator::*;
