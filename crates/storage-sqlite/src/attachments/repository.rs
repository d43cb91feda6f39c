use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde_json::json;
use std::sync::Arc;

use fieldsync_core::attachments::{
    Attachment, AttachmentRepositoryTrait, AttachmentType, CaptureMetadata, NewAttachment,
    PendingUpload, UploadStatus,
};
use fieldsync_core::consumers::SyncStatus;
use fieldsync_core::sync::{NewQueueEntry, QueueAction, SyncRecordKind};
use fieldsync_core::{Error, Result};

use super::model::{AttachmentDB, CaptureMergeDB, NewAttachmentDB};
use crate::consumers::load_by_id;
use crate::db::{enum_to_db, get_connection, now_timestamp, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{attachments, consumer_indexing};
use crate::sync::write_queue_entry;

pub struct AttachmentRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl AttachmentRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        AttachmentRepository { pool, writer }
    }

    fn pending_status() -> Result<String> {
        enum_to_db(&UploadStatus::Pending)
    }
}

fn into_pending(rows: Vec<(AttachmentDB, String)>) -> Result<Vec<PendingUpload>> {
    rows.into_iter()
        .map(|(row, consumer_id)| {
            Ok(PendingUpload {
                attachment: Attachment::try_from(row)?,
                consumer_id,
            })
        })
        .collect()
}

#[async_trait]
impl AttachmentRepositoryTrait for AttachmentRepository {
    async fn save_attachment(
        &self,
        attachment: NewAttachment,
        metadata: Option<CaptureMetadata>,
    ) -> Result<Attachment> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Attachment> {
                let record_id = attachment.record_id;
                let attachment_type = attachment.attachment_type;
                let record = load_by_id(conn, record_id)?
                    .ok_or_else(|| Error::not_found(format!("Consumer record {}", record_id)))?;

                let now = now_timestamp();
                let row = NewAttachmentDB::from_domain(attachment, &now)?;
                let replacement = row.replacement();
                diesel::insert_into(attachments::table)
                    .values(&row)
                    .on_conflict((attachments::record_id, attachments::attachment_type))
                    .do_update()
                    .set(&replacement)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                if let Some(metadata) = metadata {
                    diesel::update(consumer_indexing::table.find(record_id))
                        .set(&CaptureMergeDB::new(&metadata, now.clone()))
                        .execute(conn)
                        .map_err(StorageError::from)?;

                    let payload = json!({
                        "consumerId": record.consumer_id,
                        "attachmentType": attachment_type.as_str(),
                        "latitude": metadata.latitude,
                        "longitude": metadata.longitude,
                        "accuracy": metadata.accuracy,
                        "networkType": metadata.network_type,
                        "networkStrength": metadata.network_strength,
                        "capturedAt": metadata.captured_at.unwrap_or(now),
                    });
                    write_queue_entry(
                        conn,
                        NewQueueEntry::new(
                            SyncRecordKind::Capture,
                            record_id,
                            QueueAction::Insert,
                            payload,
                        ),
                    )?;
                }

                let saved = attachments::table
                    .filter(attachments::record_id.eq(record_id))
                    .filter(attachments::attachment_type.eq(attachment_type.as_str()))
                    .select(AttachmentDB::as_select())
                    .first::<AttachmentDB>(conn)
                    .map_err(StorageError::from)?;
                Attachment::try_from(saved)
            })
            .await
    }

    fn get_attachment(
        &self,
        record_id: i64,
        attachment_type: AttachmentType,
    ) -> Result<Option<Attachment>> {
        let mut conn = get_connection(&self.pool)?;
        attachments::table
            .filter(attachments::record_id.eq(record_id))
            .filter(attachments::attachment_type.eq(attachment_type.as_str()))
            .select(AttachmentDB::as_select())
            .first::<AttachmentDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(Attachment::try_from)
            .transpose()
    }

    fn list_for_record(&self, record_id: i64) -> Result<Vec<Attachment>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = attachments::table
            .filter(attachments::record_id.eq(record_id))
            .order(attachments::id.asc())
            .select(AttachmentDB::as_select())
            .load::<AttachmentDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(Attachment::try_from).collect()
    }

    fn list_pending_uploads_for_record(&self, record_id: i64) -> Result<Vec<PendingUpload>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = attachments::table
            .inner_join(consumer_indexing::table)
            .filter(attachments::record_id.eq(record_id))
            .filter(attachments::upload_status.eq(Self::pending_status()?))
            .order(attachments::id.asc())
            .select((AttachmentDB::as_select(), consumer_indexing::consumer_id))
            .load::<(AttachmentDB, String)>(&mut conn)
            .map_err(StorageError::from)?;
        into_pending(rows)
    }

    fn list_pending_uploads(&self, limit: i64) -> Result<Vec<PendingUpload>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = attachments::table
            .inner_join(consumer_indexing::table)
            .filter(attachments::upload_status.eq(Self::pending_status()?))
            .filter(consumer_indexing::sync_status.eq(enum_to_db(&SyncStatus::Synced)?))
            .order(attachments::id.asc())
            .limit(limit.max(0))
            .select((AttachmentDB::as_select(), consumer_indexing::consumer_id))
            .load::<(AttachmentDB, String)>(&mut conn)
            .map_err(StorageError::from)?;
        into_pending(rows)
    }

    async fn mark_uploaded(&self, attachment_id: i64, expected_updated_at: String) -> Result<bool> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let now = now_timestamp();
                let updated = diesel::update(
                    attachments::table
                        .find(attachment_id)
                        .filter(attachments::updated_at.eq(&expected_updated_at)),
                )
                .set((
                    attachments::upload_status.eq(enum_to_db(&UploadStatus::Uploaded)?),
                    attachments::uploaded_at.eq(Some(now.clone())),
                    attachments::last_error.eq(None::<String>),
                    attachments::updated_at.eq(now),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(updated > 0)
            })
            .await
    }

    async fn mark_upload_failed(
        &self,
        attachment_id: i64,
        expected_updated_at: String,
        error: String,
        max_attempts: i32,
    ) -> Result<bool> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let current = attachments::table
                    .find(attachment_id)
                    .filter(attachments::updated_at.eq(&expected_updated_at))
                    .select(attachments::upload_attempts)
                    .first::<i32>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                let Some(attempts) = current.map(|attempts| attempts.saturating_add(1)) else {
                    return Ok(false);
                };
                let status = if attempts >= max_attempts {
                    UploadStatus::Failed
                } else {
                    UploadStatus::Pending
                };
                diesel::update(attachments::table.find(attachment_id))
                    .set((
                        attachments::upload_attempts.eq(attempts),
                        attachments::upload_status.eq(enum_to_db(&status)?),
                        attachments::last_error.eq(Some(error)),
                        attachments::updated_at.eq(now_timestamp()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(true)
            })
            .await
    }
}
