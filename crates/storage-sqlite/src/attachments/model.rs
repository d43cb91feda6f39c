//! Database models for photo attachments.

use diesel::prelude::*;

use fieldsync_core::attachments::{
    Attachment, AttachmentPayload, AttachmentType, CaptureMetadata, NewAttachment, UploadStatus,
};
use fieldsync_core::errors::{Error, Result};

use crate::db::{enum_from_db, enum_to_db};

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::attachments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttachmentDB {
    pub id: i64,
    pub record_id: i64,
    pub attachment_type: String,
    pub uri: Option<String>,
    pub data: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub upload_status: String,
    pub upload_attempts: i32,
    pub last_error: Option<String>,
    pub uploaded_at: Option<String>,
}

impl TryFrom<AttachmentDB> for Attachment {
    type Error = Error;

    fn try_from(row: AttachmentDB) -> Result<Self> {
        let attachment_type = AttachmentType::parse(&row.attachment_type).ok_or_else(|| {
            Error::invalid_input(format!("Unknown attachment type '{}'", row.attachment_type))
        })?;
        let upload_status: UploadStatus = enum_from_db(&row.upload_status)?;
        Ok(Self {
            id: row.id,
            record_id: row.record_id,
            attachment_type,
            uri: row.uri,
            data: row.data,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            upload_status,
            upload_attempts: row.upload_attempts,
            last_error: row.last_error,
            uploaded_at: row.uploaded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::attachments)]
pub struct NewAttachmentDB {
    pub record_id: i64,
    pub attachment_type: String,
    pub uri: Option<String>,
    pub data: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub upload_status: String,
    pub upload_attempts: i32,
}

impl NewAttachmentDB {
    pub fn from_domain(attachment: NewAttachment, now: &str) -> Result<Self> {
        let (uri, data, size_bytes) = match attachment.payload {
            AttachmentPayload::Uri(uri) => (Some(uri), None, None),
            AttachmentPayload::Bytes(bytes) => {
                let size = bytes.len() as i64;
                (None, Some(bytes), Some(size))
            }
        };
        Ok(Self {
            record_id: attachment.record_id,
            attachment_type: attachment.attachment_type.as_str().to_string(),
            uri,
            data,
            mime_type: attachment.mime_type,
            size_bytes,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            upload_status: enum_to_db(&UploadStatus::Pending)?,
            upload_attempts: 0,
        })
    }

    /// A replacement photo restarts the upload from scratch.
    pub fn replacement(&self) -> AttachmentReplaceDB {
        AttachmentReplaceDB {
            uri: self.uri.clone(),
            data: self.data.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
            updated_at: self.updated_at.clone(),
            upload_status: self.upload_status.clone(),
            upload_attempts: 0,
            last_error: None,
            uploaded_at: None,
        }
    }
}

#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::attachments)]
#[diesel(treat_none_as_null = true)]
pub struct AttachmentReplaceDB {
    pub uri: Option<String>,
    pub data: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub updated_at: String,
    pub upload_status: String,
    pub upload_attempts: i32,
    pub last_error: Option<String>,
    pub uploaded_at: Option<String>,
}

/// Capture conditions merged into the owning record. Absent values keep
/// whatever an earlier capture recorded.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::consumer_indexing)]
pub struct CaptureMergeDB {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub gps_accuracy: Option<f64>,
    pub network_type: Option<String>,
    pub network_strength: Option<String>,
    pub modified_on: String,
}

impl CaptureMergeDB {
    pub fn new(metadata: &CaptureMetadata, now: String) -> Self {
        Self {
            latitude: metadata.latitude,
            longitude: metadata.longitude,
            gps_accuracy: metadata.accuracy,
            network_type: metadata.network_type.clone(),
            network_strength: metadata.network_strength.clone(),
            modified_on: now,
        }
    }
}
