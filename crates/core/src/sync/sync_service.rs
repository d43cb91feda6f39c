//! Sync engine: drains the queue against the remote gateway.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::gateway::{GatewayResponse, RemoteGateway};
use super::network::NetworkMonitor;
use super::sync_config::SyncConfig;
use super::sync_engine::{retry_ceiling_reached, DropReason, EntryOutcome, SyncRetryClass};
use super::sync_model::{
    CycleOutcome, QueueAction, QueueEntry, SyncEngineStatus, SyncRecordKind, SyncRunOutcome,
    SyncSummary, SyncTrigger,
};
use super::sync_scheduler::{spawn_periodic, PeriodicSyncHandle, PERIODIC_SYNC_STARTUP_DELAY_SECS};
use super::sync_traits::SyncQueueRepositoryTrait;
use super::translator::translate;
use crate::attachments::{Attachment, AttachmentRepositoryTrait, PendingUpload};
use crate::consumers::{ConsumerRepositoryTrait, SyncStatus};
use crate::Result;

/// Attachment ids already attempted in the current drain.
type AttemptedUploads = HashSet<i64>;

pub struct SyncService {
    config: SyncConfig,
    queue: Arc<dyn SyncQueueRepositoryTrait>,
    consumers: Arc<dyn ConsumerRepositoryTrait>,
    attachments: Arc<dyn AttachmentRepositoryTrait>,
    gateway: Arc<dyn RemoteGateway>,
    network: Arc<dyn NetworkMonitor>,
    drain_lock: Mutex<()>,
    last_drain_started: StdMutex<Option<Instant>>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        queue: Arc<dyn SyncQueueRepositoryTrait>,
        consumers: Arc<dyn ConsumerRepositoryTrait>,
        attachments: Arc<dyn AttachmentRepositoryTrait>,
        gateway: Arc<dyn RemoteGateway>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Self {
        Self {
            config,
            queue,
            consumers,
            attachments,
            gateway,
            network,
            drain_lock: Mutex::new(()),
            last_drain_started: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Debounced entry point. Returns immediately when a drain is in flight
    /// or the previous drain started less than `cooldown_secs` ago.
    pub async fn sync_on_demand(&self, trigger: SyncTrigger) -> SyncRunOutcome {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            debug!("[Sync] {:?} trigger ignored: drain already in flight", trigger);
            return SyncRunOutcome::AlreadySyncing;
        };

        if let Some(remaining) = self.cooldown_remaining() {
            debug!(
                "[Sync] {:?} trigger ignored: cooling down for {}ms",
                trigger,
                remaining.as_millis()
            );
            return SyncRunOutcome::CoolingDown {
                remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            };
        }

        self.mark_drain_started();
        let summary = self.drain(trigger).await;
        SyncRunOutcome::Completed { summary }
    }

    /// Drains once, waiting for any in-flight drain instead of skipping.
    pub async fn perform_sync(&self) -> SyncSummary {
        let _guard = self.drain_lock.lock().await;
        self.mark_drain_started();
        self.drain(SyncTrigger::Manual).await
    }

    /// Starts the periodic task, or returns `None` when auto sync is off.
    pub fn start_periodic(self: &Arc<Self>) -> Option<PeriodicSyncHandle> {
        if !self.config.auto_sync {
            info!("[Sync] Auto sync disabled; periodic task not started");
            return None;
        }
        Some(spawn_periodic(
            Arc::clone(self),
            Duration::from_secs(PERIODIC_SYNC_STARTUP_DELAY_SECS),
            self.config.sync_interval(),
        ))
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.queue.count()
    }

    pub fn status(&self) -> Result<SyncEngineStatus> {
        self.queue.get_engine_status()
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let started = match self.last_drain_started.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }?;
        let cooldown = self.config.cooldown();
        let elapsed = started.elapsed();
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    fn mark_drain_started(&self) {
        let now = Instant::now();
        match self.last_drain_started.lock() {
            Ok(mut guard) => *guard = Some(now),
            Err(poisoned) => *poisoned.into_inner() = Some(now),
        }
    }

    async fn drain(&self, trigger: SyncTrigger) -> SyncSummary {
        let started = Instant::now();
        let summary = self.drain_batch(trigger).await;
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        info!(
            "[Sync] Drain finished trigger={:?} status={} synced={} errors={} dropped={} total={} attachments={}/{} in {}ms",
            trigger,
            summary.cycle_status(),
            summary.synced_records,
            summary.error_records,
            summary.dropped_records,
            summary.total_records,
            summary.attachments_uploaded,
            summary.attachments_uploaded + summary.attachments_failed,
            duration_ms
        );

        let outcome = CycleOutcome {
            status: summary.cycle_status().to_string(),
            summary: summary.clone(),
            duration_ms,
        };
        if let Err(err) = self.queue.record_cycle_outcome(outcome).await {
            warn!("[Sync] Failed to persist cycle outcome: {}", err);
        }
        summary
    }

    async fn drain_batch(&self, trigger: SyncTrigger) -> SyncSummary {
        let network = self.network.state().await;
        if !network.internet_reachable {
            info!(
                "[Sync] {:?} drain skipped: network unreachable ({:?})",
                trigger, network.network_type
            );
            return SyncSummary::offline();
        }

        let entries = match self.queue.dequeue_batch(self.config.batch_size) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("[Sync] Failed to read the sync queue: {}", err);
                return SyncSummary::failed(format!("Failed to read the sync queue: {}", err));
            }
        };

        let mut summary = SyncSummary {
            success: true,
            total_records: entries.len(),
            ..Default::default()
        };
        let mut attempted = AttemptedUploads::new();

        for entry in entries {
            match self.process_entry(entry, &mut summary, &mut attempted).await {
                EntryOutcome::Synced | EntryOutcome::Superseded => summary.synced_records += 1,
                EntryOutcome::Retried { .. } | EntryOutcome::BookkeepingFailed { .. } => {
                    summary.error_records += 1
                }
                EntryOutcome::Dropped { .. } => {
                    summary.error_records += 1;
                    summary.dropped_records += 1;
                }
            }
        }

        self.sweep_pending_uploads(&mut summary, &mut attempted).await;
        summary
    }

    async fn process_entry(
        &self,
        entry: QueueEntry,
        summary: &mut SyncSummary,
        attempted: &mut AttemptedUploads,
    ) -> EntryOutcome {
        let Some(kind) = SyncRecordKind::from_table_name(&entry.table_name) else {
            let error = format!("Unsupported table '{}'", entry.table_name);
            return self.drop_entry(None, entry, DropReason::Unsupported, error).await;
        };
        let Some(action) = QueueAction::parse(&entry.action) else {
            let error = format!("Unsupported action '{}'", entry.action);
            return self.drop_entry(Some(kind), entry, DropReason::Unsupported, error).await;
        };
        let payload: serde_json::Value = match serde_json::from_str(&entry.payload) {
            Ok(payload) => payload,
            Err(err) => {
                let error = format!("Undecodable payload: {}", err);
                return self.drop_entry(Some(kind), entry, DropReason::Unsupported, error).await;
            }
        };
        let remote = match translate(kind, action, &payload) {
            Ok(remote) => remote,
            Err(err) => {
                return self
                    .drop_entry(Some(kind), entry, DropReason::Unsupported, err.to_string())
                    .await
            }
        };

        if kind.is_record_mutation() && self.is_superseded(&entry) {
            return self.discard_superseded(entry).await;
        }

        let response = self
            .call_remote(self.gateway.upsert_record(&remote.doc_id, &remote.fields))
            .await;
        if response.success {
            return self.complete_entry(kind, entry, summary, attempted).await;
        }

        let error = response.describe();
        let retry_class = response.retry_class();
        if retry_class == SyncRetryClass::Permanent {
            return self
                .drop_entry(Some(kind), entry, DropReason::Rejected, error)
                .await;
        }
        if retry_class == SyncRetryClass::ReauthRequired {
            warn!(
                "[Sync] Remote requires re-authentication ({}); entry {} stays queued",
                error, entry.id
            );
        }
        self.retry_or_drop(kind, entry, error).await
    }

    async fn complete_entry(
        &self,
        kind: SyncRecordKind,
        entry: QueueEntry,
        summary: &mut SyncSummary,
        attempted: &mut AttemptedUploads,
    ) -> EntryOutcome {
        if let Err(err) = self.queue.remove(entry.id).await {
            warn!(
                "[Sync] Entry {} accepted remotely but could not be removed: {}",
                entry.id, err
            );
            return EntryOutcome::BookkeepingFailed {
                error: err.to_string(),
            };
        }
        debug!(
            "[Sync] Synced entry {} ({} record {})",
            entry.id, entry.table_name, entry.record_id
        );

        if !kind.is_record_mutation() {
            return EntryOutcome::Synced;
        }

        self.settle_record(entry.record_id, SyncStatus::Synced, Some(entry.created_at))
            .await;

        // The remote has now seen this record, so its photos may follow.
        self.upload_pending_for_record(entry.record_id, summary, attempted)
            .await;
        EntryOutcome::Synced
    }

    async fn retry_or_drop(
        &self,
        kind: SyncRecordKind,
        entry: QueueEntry,
        error: String,
    ) -> EntryOutcome {
        if retry_ceiling_reached(entry.retry_count, self.config.max_retries) {
            return self
                .drop_entry(Some(kind), entry, DropReason::Exhausted, error)
                .await;
        }

        debug!(
            "[Sync] Entry {} failed (attempt {}): {}",
            entry.id,
            entry.retry_count + 1,
            error
        );
        if let Err(err) = self.queue.increment_retry(entry.id, Some(error.clone())).await {
            warn!(
                "[Sync] Failed to bump retry count of entry {}: {}",
                entry.id, err
            );
            return EntryOutcome::BookkeepingFailed {
                error: err.to_string(),
            };
        }
        EntryOutcome::Retried { error }
    }

    async fn drop_entry(
        &self,
        kind: Option<SyncRecordKind>,
        entry: QueueEntry,
        reason: DropReason,
        error: String,
    ) -> EntryOutcome {
        warn!(
            "[Sync] Dropping entry {} ({} record {} action {}) after {} retries: {} ({})",
            entry.id,
            entry.table_name,
            entry.record_id,
            entry.action,
            entry.retry_count,
            reason.as_str(),
            error
        );

        let entry_id = entry.id;
        let record_id = entry.record_id;
        let removal = if self.config.keep_dead_letters {
            self.queue
                .dead_letter(entry, format!("{}: {}", reason.as_str(), error))
                .await
        } else {
            self.queue.remove(entry_id).await
        };
        if let Err(err) = removal {
            warn!("[Sync] Failed to drop entry {}: {}", entry_id, err);
            return EntryOutcome::BookkeepingFailed {
                error: err.to_string(),
            };
        }

        if kind.is_some_and(|kind| kind.is_record_mutation()) {
            self.mark_record_failed(record_id).await;
        }
        EntryOutcome::Dropped { reason, error }
    }

    /// True when the remote already holds a snapshot saved after this one.
    fn is_superseded(&self, entry: &QueueEntry) -> bool {
        match self.consumers.accepted_snapshot_at(entry.record_id) {
            Ok(Some(accepted)) => entry.created_at < accepted,
            Ok(None) => false,
            Err(err) => {
                debug!(
                    "[Sync] No accepted snapshot for record {}: {}",
                    entry.record_id, err
                );
                false
            }
        }
    }

    async fn discard_superseded(&self, entry: QueueEntry) -> EntryOutcome {
        if let Err(err) = self.queue.remove(entry.id).await {
            warn!(
                "[Sync] Failed to remove superseded entry {}: {}",
                entry.id, err
            );
            return EntryOutcome::BookkeepingFailed {
                error: err.to_string(),
            };
        }
        debug!(
            "[Sync] Entry {} for record {} superseded by a newer accepted snapshot",
            entry.id, entry.record_id
        );
        self.settle_record(entry.record_id, SyncStatus::Synced, None)
            .await;
        EntryOutcome::Superseded
    }

    async fn mark_record_failed(&self, record_id: i64) {
        self.settle_record(record_id, SyncStatus::Failed, None).await;
    }

    /// Sets the record status unless a newer save is still queued, which then
    /// owns the status.
    async fn settle_record(
        &self,
        record_id: i64,
        status: SyncStatus,
        accepted_snapshot_at: Option<String>,
    ) {
        match self
            .consumers
            .settle_sync_status(record_id, status, accepted_snapshot_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(
                "[Sync] Record {} still has queued mutations; status left pending",
                record_id
            ),
            Err(err) => warn!(
                "[Sync] Failed to mark record {} {:?}: {}",
                record_id, status, err
            ),
        }
    }

    async fn upload_pending_for_record(
        &self,
        record_id: i64,
        summary: &mut SyncSummary,
        attempted: &mut AttemptedUploads,
    ) {
        let uploads = match self.attachments.list_pending_uploads_for_record(record_id) {
            Ok(uploads) => uploads,
            Err(err) => {
                warn!(
                    "[Sync] Failed to list attachments of record {}: {}",
                    record_id, err
                );
                return;
            }
        };
        for upload in uploads {
            self.upload_attachment(upload, summary, attempted).await;
        }
    }

    /// Picks up photos of already-synced records whose earlier upload failed.
    async fn sweep_pending_uploads(
        &self,
        summary: &mut SyncSummary,
        attempted: &mut AttemptedUploads,
    ) {
        let uploads = match self.attachments.list_pending_uploads(self.config.batch_size) {
            Ok(uploads) => uploads,
            Err(err) => {
                warn!("[Sync] Failed to list pending attachments: {}", err);
                return;
            }
        };
        for upload in uploads {
            self.upload_attachment(upload, summary, attempted).await;
        }
    }

    async fn upload_attachment(
        &self,
        upload: PendingUpload,
        summary: &mut SyncSummary,
        attempted: &mut AttemptedUploads,
    ) {
        let attachment_id = upload.attachment.id;
        if !attempted.insert(attachment_id) {
            return;
        }
        let sent_version = upload.attachment.updated_at.clone();

        let file_ref = upload.file_ref();
        let response = match load_attachment_bytes(&upload.attachment).await {
            Ok(bytes) => {
                self.call_remote(self.gateway.upload_attachment(&file_ref, bytes))
                    .await
            }
            Err(message) => GatewayResponse::failure(0, message),
        };

        if response.success {
            match self.attachments.mark_uploaded(attachment_id, sent_version).await {
                Ok(true) => summary.attachments_uploaded += 1,
                Ok(false) => {
                    // Replaced during the upload; the new photo stays pending.
                    debug!("[Sync] {} was replaced while uploading", file_ref);
                    summary.attachments_uploaded += 1;
                }
                Err(err) => {
                    warn!(
                        "[Sync] Uploaded {} but could not mark it: {}",
                        file_ref, err
                    );
                    summary.attachments_failed += 1;
                }
            }
            return;
        }

        summary.attachments_failed += 1;
        warn!("[Sync] Upload of {} failed: {}", file_ref, response.describe());
        let max_attempts = i32::try_from(self.config.max_retries).unwrap_or(i32::MAX);
        if let Err(err) = self
            .attachments
            .mark_upload_failed(attachment_id, sent_version, response.describe(), max_attempts)
            .await
        {
            warn!(
                "[Sync] Failed to record upload failure of {}: {}",
                file_ref, err
            );
        }
    }

    async fn call_remote<F>(&self, call: F) -> GatewayResponse
    where
        F: Future<Output = GatewayResponse>,
    {
        match tokio::time::timeout(self.config.request_timeout(), call).await {
            Ok(response) => response,
            Err(_) => GatewayResponse::timed_out(),
        }
    }
}

async fn load_attachment_bytes(attachment: &Attachment) -> std::result::Result<Vec<u8>, String> {
    if let Some(data) = &attachment.data {
        return Ok(data.clone());
    }
    let uri = attachment
        .uri
        .as_deref()
        .ok_or_else(|| "Attachment has neither bytes nor a uri".to_string())?;
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    tokio::fs::read(path)
        .await
        .map_err(|err| format!("Failed to read {}: {}", path, err))
}
