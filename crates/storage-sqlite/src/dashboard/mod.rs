//! Persisted dashboard counters.

mod repository;

pub use repository::DashboardRepository;
