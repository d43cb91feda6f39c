//! Per-kind payload translators: local snapshot shape to remote document shape.

use serde_json::{Map, Value};
use thiserror::Error;

use super::sync_model::{QueueAction, SyncRecordKind};

/// A translated document ready for [`super::RemoteGateway::upsert_record`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePayload {
    pub doc_id: String,
    pub fields: Map<String, Value>,
}

/// Translation failures are permanent: re-sending the same payload cannot help.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Payload is not a JSON object")]
    NotAnObject,
    #[error("Payload is missing required key '{0}'")]
    MissingKey(&'static str),
}

/// Local field name to remote field name. Unlisted fields keep their name.
const RECORD_FIELD_RENAMES: &[(&str, &str)] = &[
    ("consumerId", "consumerNumber"),
    ("surveyMeterNumber", "meterNoSurveyed"),
    ("meterReading", "currentReading"),
    ("latitude", "gpsLat"),
    ("longitude", "gpsLong"),
    ("status", "surveyStatus"),
];

/// Bookkeeping the remote has no use for.
const LOCAL_ONLY_FIELDS: &[&str] = &["id", "syncStatus", "lastSyncedOn"];

/// Fields a draft save is allowed to push.
const DRAFT_FIELDS: &[&str] = &[
    "consumerId",
    "surveyMeterNumber",
    "meterReading",
    "meterStatus",
    "premiseType",
    "occupancyStatus",
    "remarks",
    "modifiedOn",
    "modifiedBy",
];

const CAPTURE_FIELD_RENAMES: &[(&str, &str)] = &[
    ("consumerId", "consumerNumber"),
    ("latitude", "gpsLat"),
    ("longitude", "gpsLong"),
    ("accuracy", "gpsAccuracy"),
];

pub fn translate(
    kind: SyncRecordKind,
    action: QueueAction,
    payload: &Value,
) -> Result<RemotePayload, TranslateError> {
    let object = payload.as_object().ok_or(TranslateError::NotAnObject)?;
    let mut translated = match kind {
        SyncRecordKind::ConsumerIndexing => translate_record(object)?,
        SyncRecordKind::ConsumerDraft => translate_draft(object)?,
        SyncRecordKind::Capture => translate_capture(object)?,
    };
    translated
        .fields
        .insert("action".to_string(), Value::String(action.as_str().to_string()));
    Ok(translated)
}

fn translate_record(object: &Map<String, Value>) -> Result<RemotePayload, TranslateError> {
    let doc_id = required_str(object, "consumerId")?;
    let fields = object
        .iter()
        .filter(|(key, _)| !LOCAL_ONLY_FIELDS.contains(&key.as_str()))
        .filter(|(_, value)| is_meaningful(value))
        .map(|(key, value)| (rename(key, RECORD_FIELD_RENAMES), value.clone()))
        .collect();
    Ok(RemotePayload { doc_id, fields })
}

fn translate_draft(object: &Map<String, Value>) -> Result<RemotePayload, TranslateError> {
    let doc_id = required_str(object, "consumerId")?;
    let mut fields: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| DRAFT_FIELDS.contains(&key.as_str()))
        .filter(|(_, value)| is_meaningful(value))
        .map(|(key, value)| (rename(key, RECORD_FIELD_RENAMES), value.clone()))
        .collect();
    fields.insert(
        "surveyStatus".to_string(),
        Value::String("draft".to_string()),
    );
    Ok(RemotePayload { doc_id, fields })
}

fn translate_capture(object: &Map<String, Value>) -> Result<RemotePayload, TranslateError> {
    let consumer_id = required_str(object, "consumerId")?;
    let attachment_type = required_str(object, "attachmentType")?;
    let fields = object
        .iter()
        .filter(|(_, value)| is_meaningful(value))
        .map(|(key, value)| (rename(key, CAPTURE_FIELD_RENAMES), value.clone()))
        .collect();
    Ok(RemotePayload {
        doc_id: format!("{}-{}-capture", consumer_id, attachment_type),
        fields,
    })
}

fn required_str(object: &Map<String, Value>, key: &'static str) -> Result<String, TranslateError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(TranslateError::MissingKey(key))
}

fn rename(key: &str, renames: &[(&str, &str)]) -> String {
    renames
        .iter()
        .find(|(local, _)| *local == key)
        .map(|(_, remote)| (*remote).to_string())
        .unwrap_or_else(|| key.to_string())
}

fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_fields_are_renamed_and_pruned() {
        let payload = json!({
            "id": 7,
            "consumerId": "C-1001",
            "consumerName": "R. Kumar",
            "surveyMeterNumber": "MTR-9",
            "meterReading": 1520.5,
            "latitude": 17.38,
            "longitude": 78.48,
            "status": "completed",
            "syncStatus": "pending",
            "remarks": "",
            "address": null
        });

        let out = translate(SyncRecordKind::ConsumerIndexing, QueueAction::Insert, &payload).unwrap();
        assert_eq!(out.doc_id, "C-1001");
        assert_eq!(out.fields["consumerNumber"], "C-1001");
        assert_eq!(out.fields["meterNoSurveyed"], "MTR-9");
        assert_eq!(out.fields["currentReading"], 1520.5);
        assert_eq!(out.fields["gpsLat"], 17.38);
        assert_eq!(out.fields["surveyStatus"], "completed");
        assert_eq!(out.fields["action"], "INSERT");
        assert!(!out.fields.contains_key("id"));
        assert!(!out.fields.contains_key("syncStatus"));
        assert!(!out.fields.contains_key("remarks"));
        assert!(!out.fields.contains_key("address"));
    }

    #[test]
    fn draft_only_carries_editable_fields() {
        let payload = json!({
            "consumerId": "C-1",
            "consumerName": "not sent",
            "meterStatus": "burnt",
            "status": "draft"
        });
        let out = translate(SyncRecordKind::ConsumerDraft, QueueAction::Update, &payload).unwrap();
        assert_eq!(out.fields["meterStatus"], "burnt");
        assert_eq!(out.fields["surveyStatus"], "draft");
        assert_eq!(out.fields["action"], "UPDATE");
        assert!(!out.fields.contains_key("consumerName"));
    }

    #[test]
    fn capture_doc_id_combines_consumer_and_type() {
        let payload = json!({
            "consumerId": "C-1",
            "attachmentType": "meter_photo",
            "latitude": 1.0,
            "longitude": 2.0,
            "accuracy": 4.5,
            "networkType": "cellular"
        });
        let out = translate(SyncRecordKind::Capture, QueueAction::Insert, &payload).unwrap();
        assert_eq!(out.doc_id, "C-1-meter_photo-capture");
        assert_eq!(out.fields["gpsAccuracy"], 4.5);
        assert_eq!(out.fields["networkType"], "cellular");
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_eq!(
            translate(SyncRecordKind::ConsumerIndexing, QueueAction::Insert, &json!([1, 2])),
            Err(TranslateError::NotAnObject)
        );
        assert_eq!(
            translate(SyncRecordKind::Capture, QueueAction::Insert, &json!({"consumerId": "C-1"})),
            Err(TranslateError::MissingKey("attachmentType"))
        );
    }
}
