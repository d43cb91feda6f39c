use log::{debug, warn};
use std::sync::Arc;

use super::consumers_model::{
    ConsumerRecord, NewConsumerRecord, RecordFilter, SaveMode, SurveyUpdate,
};
use super::consumers_traits::ConsumerRepositoryTrait;
use crate::attachments::{
    Attachment, AttachmentPayload, AttachmentRepositoryTrait, CaptureMetadata, NewAttachment,
};
use crate::dashboard::{DashboardCounters, DashboardRepositoryTrait};
use crate::{Error, Result};

const MAX_PAGE_SIZE: i64 = 500;
const MAX_REMARKS_CHARS: usize = 1000;

/// Form-facing operations over consumer surveys.
pub struct ConsumerService {
    consumers: Arc<dyn ConsumerRepositoryTrait>,
    attachments: Arc<dyn AttachmentRepositoryTrait>,
    dashboard: Arc<dyn DashboardRepositoryTrait>,
}

impl ConsumerService {
    pub fn new(
        consumers: Arc<dyn ConsumerRepositoryTrait>,
        attachments: Arc<dyn AttachmentRepositoryTrait>,
        dashboard: Arc<dyn DashboardRepositoryTrait>,
    ) -> Self {
        Self {
            consumers,
            attachments,
            dashboard,
        }
    }

    pub async fn import_consumers(&self, records: Vec<NewConsumerRecord>) -> Result<Vec<i64>> {
        for record in &records {
            validate_new_consumer(record)?;
        }

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(self.consumers.upsert_imported(record).await?);
        }
        debug!("[Consumers] Imported {} assigned consumers", ids.len());

        self.refresh_dashboard_best_effort().await;
        Ok(ids)
    }

    pub async fn register_consumer(
        &self,
        record: NewConsumerRecord,
        user: String,
    ) -> Result<ConsumerRecord> {
        validate_new_consumer(&record)?;
        if self
            .consumers
            .get_by_consumer_id(record.consumer_id.trim())?
            .is_some()
        {
            return Err(Error::invalid_input(format!(
                "Consumer '{}' already exists",
                record.consumer_id.trim()
            )));
        }

        let saved = self.consumers.register_consumer(record, user).await?;
        self.refresh_dashboard_best_effort().await;
        Ok(saved)
    }

    pub async fn save_survey(
        &self,
        consumer_id: String,
        update: SurveyUpdate,
        mode: SaveMode,
        user: String,
    ) -> Result<ConsumerRecord> {
        validate_survey_update(&update)?;
        let saved = self
            .consumers
            .save_survey(consumer_id, update, mode, user)
            .await?;
        self.refresh_dashboard_best_effort().await;
        Ok(saved)
    }

    pub async fn save_attachment(
        &self,
        attachment: NewAttachment,
        metadata: Option<CaptureMetadata>,
    ) -> Result<Attachment> {
        match &attachment.payload {
            AttachmentPayload::Uri(uri) if uri.trim().is_empty() => {
                return Err(Error::missing_field("uri"));
            }
            AttachmentPayload::Bytes(bytes) if bytes.is_empty() => {
                return Err(Error::invalid_input("Attachment payload is empty"));
            }
            _ => {}
        }
        if let Some(metadata) = &metadata {
            validate_capture_metadata(metadata)?;
        }

        self.attachments.save_attachment(attachment, metadata).await
    }

    pub fn get_consumer(&self, consumer_id: &str) -> Result<ConsumerRecord> {
        self.consumers
            .get_by_consumer_id(consumer_id)?
            .ok_or_else(|| Error::not_found(format!("Consumer '{}'", consumer_id)))
    }

    pub fn query_consumers(
        &self,
        filter: &RecordFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConsumerRecord>> {
        self.consumers
            .query(filter, limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
    }

    pub fn list_attachments(&self, record_id: i64) -> Result<Vec<Attachment>> {
        self.attachments.list_for_record(record_id)
    }

    pub fn dashboard(&self) -> Result<DashboardCounters> {
        self.dashboard.get_counters()
    }

    pub async fn refresh_dashboard(&self) -> Result<DashboardCounters> {
        self.dashboard.rebuild_counters().await
    }

    pub async fn wipe_all(&self) -> Result<()> {
        warn!("[Consumers] Wiping all local survey data");
        self.consumers.wipe_all().await?;
        self.refresh_dashboard_best_effort().await;
        Ok(())
    }

    async fn refresh_dashboard_best_effort(&self) {
        if let Err(err) = self.dashboard.rebuild_counters().await {
            warn!("[Consumers] Dashboard counters not refreshed: {}", err);
        }
    }
}

pub fn validate_new_consumer(record: &NewConsumerRecord) -> Result<()> {
    if record.consumer_id.trim().is_empty() {
        return Err(Error::missing_field("consumerId"));
    }
    if let Some(load) = record.sanctioned_load {
        if !load.is_finite() || load < 0.0 {
            return Err(Error::invalid_input("sanctionedLoad must be a non-negative number"));
        }
    }
    Ok(())
}

pub fn validate_survey_update(update: &SurveyUpdate) -> Result<()> {
    if let Some(reading) = update.meter_reading {
        if !reading.is_finite() || reading < 0.0 {
            return Err(Error::invalid_input("meterReading must be a non-negative number"));
        }
    }
    if let Some(remarks) = &update.remarks {
        if remarks.chars().count() > MAX_REMARKS_CHARS {
            return Err(Error::invalid_input(format!(
                "remarks exceeds {} characters",
                MAX_REMARKS_CHARS
            )));
        }
    }
    Ok(())
}

pub fn validate_capture_metadata(metadata: &CaptureMetadata) -> Result<()> {
    if let Some(latitude) = metadata.latitude {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::invalid_input("latitude out of range"));
        }
    }
    if let Some(longitude) = metadata.longitude {
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::invalid_input("longitude out of range"));
        }
    }
    if matches!(metadata.accuracy, Some(accuracy) if accuracy < 0.0) {
        return Err(Error::invalid_input("accuracy must be non-negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_id_is_required() {
        let record = NewConsumerRecord {
            consumer_id: "   ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            validate_new_consumer(&record),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn negative_meter_reading_is_rejected() {
        let update = SurveyUpdate {
            meter_reading: Some(-1.0),
            ..Default::default()
        };
        assert!(validate_survey_update(&update).is_err());

        let update = SurveyUpdate {
            meter_reading: Some(1234.5),
            remarks: Some("Meter behind gate".to_string()),
            ..Default::default()
        };
        assert!(validate_survey_update(&update).is_ok());
    }

    #[test]
    fn capture_metadata_bounds() {
        let ok = CaptureMetadata {
            latitude: Some(12.97),
            longitude: Some(77.59),
            accuracy: Some(8.0),
            ..Default::default()
        };
        assert!(validate_capture_metadata(&ok).is_ok());

        let bad = CaptureMetadata {
            latitude: Some(97.0),
            ..Default::default()
        };
        assert!(validate_capture_metadata(&bad).is_err());
    }
}
