//! Sync queue domain models.

use serde::{Deserialize, Serialize};

/// Record kinds that can travel through the sync queue. Each kind owns its
/// queue table name, its default priority and its payload translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRecordKind {
    /// Submitted or ready-to-sync consumer survey (identity/profile data).
    ConsumerIndexing,
    /// Intermediate draft save of a consumer survey.
    ConsumerDraft,
    /// Photo capture telemetry (GPS/network at capture time).
    Capture,
}

impl SyncRecordKind {
    pub const ALL: [SyncRecordKind; 3] = [
        SyncRecordKind::ConsumerIndexing,
        SyncRecordKind::ConsumerDraft,
        SyncRecordKind::Capture,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            SyncRecordKind::ConsumerIndexing => "consumer_indexing",
            SyncRecordKind::ConsumerDraft => "consumer_drafts",
            SyncRecordKind::Capture => "captures",
        }
    }

    pub fn from_table_name(table_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.table_name() == table_name)
    }

    pub fn default_priority(&self) -> SyncPriority {
        match self {
            SyncRecordKind::ConsumerIndexing => SyncPriority::Identity,
            SyncRecordKind::ConsumerDraft => SyncPriority::Bulk,
            SyncRecordKind::Capture => SyncPriority::Telemetry,
        }
    }

    /// Kinds that replicate the consumer row itself. Only these move the
    /// record's sync status and unlock attachment uploads.
    pub fn is_record_mutation(&self) -> bool {
        matches!(
            self,
            SyncRecordKind::ConsumerIndexing | SyncRecordKind::ConsumerDraft
        )
    }
}

/// Queue table names that describe record mutations.
pub fn record_mutation_tables() -> Vec<&'static str> {
    SyncRecordKind::ALL
        .into_iter()
        .filter(SyncRecordKind::is_record_mutation)
        .map(|kind| kind.table_name())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueAction {
    Insert,
    Update,
}

impl QueueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::Insert => "INSERT",
            QueueAction::Update => "UPDATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INSERT" => Some(QueueAction::Insert),
            "UPDATE" => Some(QueueAction::Update),
            _ => None,
        }
    }
}

/// Lower value drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SyncPriority {
    Identity = 1,
    Bulk = 2,
    Telemetry = 3,
}

impl SyncPriority {
    pub fn value(&self) -> i32 {
        *self as i32
    }
}

/// A durable, serialized intent to replicate one mutation.
///
/// `table_name` and `action` stay raw strings: rows written by another build
/// may name kinds this build does not know, and the engine must be able to
/// reject them as permanent failures instead of failing to load the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub action: String,
    pub payload: String,
    pub priority: i32,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: String,
}

/// Enqueue request. Mirrors [`QueueEntry`] minus the fields the store assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueEntry {
    pub table_name: String,
    pub record_id: i64,
    pub action: QueueAction,
    pub payload: serde_json::Value,
    pub priority: i32,
}

impl NewQueueEntry {
    pub fn new(
        kind: SyncRecordKind,
        record_id: i64,
        action: QueueAction,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            table_name: kind.table_name().to_string(),
            record_id,
            action,
            payload,
            priority: kind.default_priority().value(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Persisted copy of an entry that was dropped from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: i64,
    pub queue_entry_id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub action: String,
    pub payload: String,
    pub priority: i32,
    pub retry_count: i32,
    pub reason: String,
    pub created_at: String,
    pub dropped_at: String,
}

/// Aggregate result of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// The drain ran to completion. Per-entry failures are counted, not fatal.
    pub success: bool,
    pub synced_records: usize,
    pub error_records: usize,
    pub total_records: usize,
    /// Entries removed without reaching the remote (ceiling or permanent).
    pub dropped_records: usize,
    pub attachments_uploaded: usize,
    pub attachments_failed: usize,
    pub skipped_offline: bool,
    pub message: Option<String>,
}

impl SyncSummary {
    pub fn offline() -> Self {
        Self {
            success: true,
            skipped_offline: true,
            message: Some("Network unreachable, sync skipped".to_string()),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Short status label persisted with the engine state.
    pub fn cycle_status(&self) -> &'static str {
        if !self.success {
            "error"
        } else if self.skipped_offline {
            "offline"
        } else if self.error_records > 0 || self.attachments_failed > 0 {
            "partial"
        } else {
            "ok"
        }
    }
}

/// Trigger source for a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,
    Periodic,
    LocalMutation,
    Manual,
}

/// What a call to `sync_on_demand` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SyncRunOutcome {
    Completed { summary: SyncSummary },
    AlreadySyncing,
    CoolingDown { remaining_ms: u64 },
}

impl SyncRunOutcome {
    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            SyncRunOutcome::Completed { summary } => Some(summary),
            _ => None,
        }
    }

    pub fn did_drain(&self) -> bool {
        matches!(self, SyncRunOutcome::Completed { .. })
    }
}

/// Bookkeeping written after each drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub status: String,
    pub summary: SyncSummary,
    pub duration_ms: i64,
}

/// Operator-facing engine status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_sync_at: Option<String>,
    pub last_cycle_status: Option<String>,
    pub last_synced_records: i64,
    pub last_error_records: i64,
    pub last_total_records: i64,
    pub last_dropped_records: i64,
    pub total_dropped_records: i64,
    pub consecutive_failures: i32,
    pub last_error: Option<String>,
    pub last_cycle_duration_ms: Option<i64>,
    pub pending_entries: i64,
    pub dead_letters: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_resolve_from_table_names() {
        for kind in SyncRecordKind::ALL {
            assert_eq!(SyncRecordKind::from_table_name(kind.table_name()), Some(kind));
        }
        assert_eq!(SyncRecordKind::from_table_name("meter_swaps"), None);
    }

    #[test]
    fn priorities_follow_kind() {
        assert_eq!(SyncRecordKind::ConsumerIndexing.default_priority().value(), 1);
        assert_eq!(SyncRecordKind::ConsumerDraft.default_priority().value(), 2);
        assert_eq!(SyncRecordKind::Capture.default_priority().value(), 3);
    }

    #[test]
    fn record_mutation_tables_exclude_captures() {
        assert_eq!(
            record_mutation_tables(),
            vec!["consumer_indexing", "consumer_drafts"]
        );
    }

    #[test]
    fn action_wire_format_is_upper_case() {
        assert_eq!(
            serde_json::to_string(&QueueAction::Insert).unwrap(),
            "\"INSERT\""
        );
        assert_eq!(QueueAction::parse("UPDATE"), Some(QueueAction::Update));
        assert_eq!(QueueAction::parse("DELETE"), None);
    }

    #[test]
    fn cycle_status_labels() {
        assert_eq!(SyncSummary::offline().cycle_status(), "offline");
        assert_eq!(SyncSummary::failed("boom").cycle_status(), "error");
        let partial = SyncSummary {
            success: true,
            error_records: 1,
            ..Default::default()
        };
        assert_eq!(partial.cycle_status(), "partial");
    }

    #[test]
    fn run_outcome_is_tagged() {
        let json = serde_json::to_value(SyncRunOutcome::AlreadySyncing).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "already_syncing" }));
    }
}
