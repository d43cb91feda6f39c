//! Consumer survey endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use fieldsync_core::attachments::{
    Attachment, AttachmentPayload, AttachmentType, CaptureMetadata, NewAttachment,
};
use fieldsync_core::consumers::{
    ConsumerRecord, NewConsumerRecord, RecordFilter, SaveMode, SurveyUpdate,
};
use fieldsync_core::dashboard::DashboardCounters;

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportResponse {
    imported: usize,
    ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    user: String,
    #[serde(flatten)]
    record: NewConsumerRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveSurveyRequest {
    mode: SaveMode,
    user: String,
    #[serde(flatten)]
    update: SurveyUpdate,
}

fn parse_page_param(params: &HashMap<String, String>, key: &str, default: i64) -> ApiResult<i64> {
    match params.get(key) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest(format!("{} must be an integer", key))),
        None => Ok(default),
    }
}

async fn list_consumers(
    State(state): State<Arc<AppState>>,
    Query(mut params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<ConsumerRecord>>> {
    let limit = parse_page_param(&params, "limit", DEFAULT_PAGE_SIZE)?;
    let offset = parse_page_param(&params, "offset", 0)?;
    params.remove("limit");
    params.remove("offset");

    let filter = RecordFilter(params.into_iter().collect());
    let records = state
        .consumer_service()
        .query_consumers(&filter, limit, offset)?;
    Ok(Json(records))
}

async fn get_consumer(
    State(state): State<Arc<AppState>>,
    Path(consumer_id): Path<String>,
) -> ApiResult<Json<ConsumerRecord>> {
    Ok(Json(state.consumer_service().get_consumer(&consumer_id)?))
}

async fn import_consumers(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<NewConsumerRecord>>,
) -> ApiResult<Json<ImportResponse>> {
    let ids = state.consumer_service().import_consumers(records).await?;
    Ok(Json(ImportResponse {
        imported: ids.len(),
        ids,
    }))
}

async fn register_consumer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ConsumerRecord>)> {
    let saved = state
        .consumer_service()
        .register_consumer(request.record, request.user)
        .await?;
    state.notify_local_mutation();
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn save_survey(
    State(state): State<Arc<AppState>>,
    Path(consumer_id): Path<String>,
    Json(request): Json<SaveSurveyRequest>,
) -> ApiResult<Json<ConsumerRecord>> {
    let saved = state
        .consumer_service()
        .save_survey(consumer_id, request.update, request.mode, request.user)
        .await?;
    state.notify_local_mutation();
    Ok(Json(saved))
}

/// The body is the raw photo; capture conditions ride along as query params.
async fn save_attachment(
    State(state): State<Arc<AppState>>,
    Path((record_id, attachment_type)): Path<(i64, String)>,
    Query(metadata): Query<CaptureMetadata>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Attachment>> {
    let attachment_type = AttachmentType::parse(&attachment_type).ok_or_else(|| {
        ApiError::BadRequest(format!("Unknown attachment type '{}'", attachment_type))
    })?;
    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let metadata = (metadata != CaptureMetadata::default()).then_some(metadata);

    let saved = state
        .consumer_service()
        .save_attachment(
            NewAttachment {
                record_id,
                attachment_type,
                payload: AttachmentPayload::Bytes(body.to_vec()),
                mime_type,
            },
            metadata,
        )
        .await?;
    state.notify_local_mutation();
    Ok(Json(saved))
}

async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Path(record_id): Path<i64>,
) -> ApiResult<Json<Vec<Attachment>>> {
    Ok(Json(state.consumer_service().list_attachments(record_id)?))
}

async fn get_dashboard(State(state): State<Arc<AppState>>) -> ApiResult<Json<DashboardCounters>> {
    Ok(Json(state.consumer_service().dashboard()?))
}

async fn refresh_dashboard(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<DashboardCounters>> {
    Ok(Json(state.consumer_service().refresh_dashboard().await?))
}

async fn wipe_local_data(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    state.consumer_service().wipe_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/consumers", get(list_consumers).post(register_consumer))
        .route("/consumers/import", post(import_consumers))
        .route("/consumers/{consumer_id}", get(get_consumer))
        .route("/consumers/{consumer_id}/survey", put(save_survey))
        .route("/records/{record_id}/attachments", get(list_attachments))
        .route(
            "/records/{record_id}/attachments/{attachment_type}",
            put(save_attachment),
        )
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/refresh", post(refresh_dashboard))
        .route("/data", delete(wipe_local_data))
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn import_survey_and_list_round() {
        let server = test_support::start().await;
        let client = reqwest::Client::new();

        let imported: Value = client
            .post(format!("{}/consumers/import", server.base_url))
            .json(&json!([
                { "consumerId": "C-1", "consumerName": "Asha", "division": "North" },
                { "consumerId": "C-2", "consumerName": "Bilal", "division": "South" }
            ]))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(imported["imported"], 2);

        let saved = client
            .put(format!("{}/consumers/C-1/survey", server.base_url))
            .json(&json!({ "mode": "submit", "user": "surveyor", "meterReading": 120.5 }))
            .send()
            .await
            .unwrap();
        assert!(saved.status().is_success());
        let saved: Value = saved.json().await.unwrap();
        assert_eq!(saved["status"], "completed");
        assert_eq!(saved["syncStatus"], "pending");

        let north: Value = client
            .get(format!("{}/consumers?division=North&limit=10", server.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(north.as_array().unwrap().len(), 1);
        assert_eq!(north[0]["consumerId"], "C-1");

        let dashboard: Value = client
            .get(format!("{}/dashboard", server.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(dashboard["total"], 2);
        assert_eq!(dashboard["completed"], 1);
    }

    #[tokio::test]
    async fn unknown_consumer_is_404() {
        let server = test_support::start().await;
        let client = reqwest::Client::new();

        let response = client
            .put(format!("{}/consumers/missing/survey", server.base_url))
            .json(&json!({ "mode": "draft", "user": "u" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn photo_upload_merges_capture_metadata() {
        let server = test_support::start().await;
        let client = reqwest::Client::new();

        let imported: Value = client
            .post(format!("{}/consumers/import", server.base_url))
            .json(&json!([{ "consumerId": "C-9" }]))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let record_id = imported["ids"][0].as_i64().unwrap();

        let response = client
            .put(format!(
                "{}/records/{}/attachments/meter_photo?latitude=12.5&longitude=77.5",
                server.base_url, record_id
            ))
            .header("content-type", "image/jpeg")
            .body(vec![0xFF, 0xD8])
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let attachment: Value = response.json().await.unwrap();
        assert_eq!(attachment["attachmentType"], "meter_photo");
        assert_eq!(attachment["mimeType"], "image/jpeg");

        let record: Value = client
            .get(format!("{}/consumers/C-9", server.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(record["latitude"], 12.5);

        let bad_type = client
            .put(format!(
                "{}/records/{}/attachments/selfie",
                server.base_url, record_id
            ))
            .body(vec![1])
            .send()
            .await
            .unwrap();
        assert_eq!(bad_type.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
