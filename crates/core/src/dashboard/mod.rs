//! Denormalized status counters shown on the home screen.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Counter buckets persisted in `dashboard_counters`.
pub const COUNTER_BUCKETS: [&str; 8] = [
    "total",
    "assigned",
    "draft",
    "to_sync",
    "completed",
    "sync_pending",
    "synced",
    "sync_failed",
];

/// Aggregate counts per status bucket. Derived data: may be briefly stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounters {
    pub total: i64,
    pub assigned: i64,
    pub draft: i64,
    pub to_sync: i64,
    pub completed: i64,
    pub sync_pending: i64,
    pub synced: i64,
    pub sync_failed: i64,
    pub updated_at: Option<String>,
}

impl DashboardCounters {
    pub fn set_bucket(&mut self, bucket: &str, value: i64) {
        match bucket {
            "total" => self.total = value,
            "assigned" => self.assigned = value,
            "draft" => self.draft = value,
            "to_sync" => self.to_sync = value,
            "completed" => self.completed = value,
            "sync_pending" => self.sync_pending = value,
            "synced" => self.synced = value,
            "sync_failed" => self.sync_failed = value,
            other => log::debug!("[Dashboard] Ignoring unknown counter bucket '{}'", other),
        }
    }

    pub fn buckets(&self) -> [(&'static str, i64); 8] {
        [
            ("total", self.total),
            ("assigned", self.assigned),
            ("draft", self.draft),
            ("to_sync", self.to_sync),
            ("completed", self.completed),
            ("sync_pending", self.sync_pending),
            ("synced", self.synced),
            ("sync_failed", self.sync_failed),
        ]
    }
}

#[async_trait]
pub trait DashboardRepositoryTrait: Send + Sync {
    /// Persisted counters, as of the last rebuild.
    fn get_counters(&self) -> Result<DashboardCounters>;

    /// Recompute every bucket from the record table and persist it.
    async fn rebuild_counters(&self) -> Result<DashboardCounters>;
}
