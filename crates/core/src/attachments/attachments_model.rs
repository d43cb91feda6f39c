//! Photo attachment models.

use serde::{Deserialize, Serialize};

/// Closed set of photos a survey can carry. One attachment per type per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentType {
    PolePhoto,
    MeterPhoto,
    HousePhoto,
    MeterReadingPhoto,
}

impl AttachmentType {
    pub const ALL: [AttachmentType; 4] = [
        AttachmentType::PolePhoto,
        AttachmentType::MeterPhoto,
        AttachmentType::HousePhoto,
        AttachmentType::MeterReadingPhoto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentType::PolePhoto => "pole_photo",
            AttachmentType::MeterPhoto => "meter_photo",
            AttachmentType::HousePhoto => "house_photo",
            AttachmentType::MeterReadingPhoto => "meter_reading_photo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Pending,
    Uploaded,
    Failed,
}

/// Attachment content: either a file the camera wrote, or the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum AttachmentPayload {
    Uri(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: i64,
    pub record_id: i64,
    pub attachment_type: AttachmentType,
    pub uri: Option<String>,
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub upload_status: UploadStatus,
    pub upload_attempts: i32,
    pub last_error: Option<String>,
    pub uploaded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Attachment {
    /// File extension used when naming the remote object.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_deref() {
            Some("image/png") => "png",
            Some("image/webp") => "webp",
            _ => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    pub record_id: i64,
    pub attachment_type: AttachmentType,
    pub payload: AttachmentPayload,
    pub mime_type: Option<String>,
}

/// GPS / network conditions at capture time. Merged into the owning record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureMetadata {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub network_type: Option<String>,
    pub network_strength: Option<String>,
    pub captured_at: Option<String>,
}

impl CaptureMetadata {
    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// An attachment waiting for upload, with the business key of its record.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    pub attachment: Attachment,
    pub consumer_id: String,
}

impl PendingUpload {
    /// Remote object name: `{consumerId}/{type}.{ext}`.
    pub fn file_ref(&self) -> String {
        format!(
            "{}/{}.{}",
            self.consumer_id,
            self.attachment.attachment_type.as_str(),
            self.attachment.extension()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_type_round_trips_through_str() {
        for kind in AttachmentType::ALL {
            assert_eq!(AttachmentType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AttachmentType::parse("selfie"), None);
    }

    #[test]
    fn file_ref_uses_consumer_and_type() {
        let upload = PendingUpload {
            consumer_id: "C-77".to_string(),
            attachment: Attachment {
                id: 1,
                record_id: 9,
                attachment_type: AttachmentType::MeterPhoto,
                uri: Some("/tmp/meter.png".to_string()),
                data: None,
                mime_type: Some("image/png".to_string()),
                size_bytes: None,
                upload_status: UploadStatus::Pending,
                upload_attempts: 0,
                last_error: None,
                uploaded_at: None,
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        };
        assert_eq!(upload.file_ref(), "C-77/meter_photo.png");
    }

    #[test]
    fn payload_uses_tagged_representation() {
        let json = serde_json::to_value(AttachmentPayload::Uri("file:///a.jpg".into())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "uri", "value": "file:///a.jpg" })
        );
    }
}
