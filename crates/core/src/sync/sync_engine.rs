//! Core helpers for sync engine orchestration.

use serde::{Deserialize, Serialize};

/// Retry policy classification for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

impl SyncRetryClass {
    pub fn code(&self) -> &'static str {
        match self {
            SyncRetryClass::Retryable => "retryable",
            SyncRetryClass::Permanent => "permanent",
            SyncRetryClass::ReauthRequired => "reauth_required",
        }
    }
}

/// Classify HTTP status into retry behavior. `0` stands for "no response"
/// (transport failure or timeout).
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        0 => SyncRetryClass::Retryable,
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Result of processing a single queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Remote accepted the mutation and the entry was removed.
    Synced,
    /// A newer snapshot of the record already reached the remote; the entry
    /// was removed unsent.
    Superseded,
    /// Remote failed retryably; retry count bumped, entry stays queued.
    Retried { error: String },
    /// Entry removed without reaching the remote.
    Dropped { reason: DropReason, error: String },
    /// Remote accepted but local bookkeeping failed; entry will be re-sent.
    BookkeepingFailed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Retry ceiling reached.
    Exhausted,
    /// Remote rejected the payload permanently.
    Rejected,
    /// The entry names a table or action this build cannot translate.
    Unsupported,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Exhausted => "retry_ceiling_exceeded",
            DropReason::Rejected => "rejected",
            DropReason::Unsupported => "unsupported",
        }
    }
}

/// Retry ceiling check: an entry that already failed `max_retries` times is
/// dropped on its next failure.
pub fn retry_ceiling_reached(retry_count: i32, max_retries: u32) -> bool {
    i64::from(retry_count) >= i64::from(max_retries)
}
