use async_trait::async_trait;

use super::attachments_model::{
    Attachment, AttachmentType, CaptureMetadata, NewAttachment, PendingUpload,
};
use crate::Result;

#[async_trait]
pub trait AttachmentRepositoryTrait: Send + Sync {
    /// Replace-semantics write keyed by `(record_id, type)`. When metadata is
    /// given it is merged into the owning record and a capture telemetry
    /// entry is queued, all in one transaction.
    async fn save_attachment(
        &self,
        attachment: NewAttachment,
        metadata: Option<CaptureMetadata>,
    ) -> Result<Attachment>;

    fn get_attachment(
        &self,
        record_id: i64,
        attachment_type: AttachmentType,
    ) -> Result<Option<Attachment>>;

    fn list_for_record(&self, record_id: i64) -> Result<Vec<Attachment>>;

    /// Pending uploads of one record, regardless of the record's sync status.
    fn list_pending_uploads_for_record(&self, record_id: i64) -> Result<Vec<PendingUpload>>;

    /// Pending uploads of records already synced to the remote.
    fn list_pending_uploads(&self, limit: i64) -> Result<Vec<PendingUpload>>;

    /// Marks the photo uploaded if it still carries `expected_updated_at`.
    /// Returns `false` when it was replaced while the upload was in flight.
    async fn mark_uploaded(&self, attachment_id: i64, expected_updated_at: String) -> Result<bool>;

    /// Records a failed attempt; the attachment stops being retried once
    /// `max_attempts` is reached. A photo replaced since `expected_updated_at`
    /// already has a fresh upload state and is left untouched.
    async fn mark_upload_failed(
        &self,
        attachment_id: i64,
        expected_updated_at: String,
        error: String,
        max_attempts: i32,
    ) -> Result<bool>;
}
