//! Consumer survey domain models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Business lifecycle of a survey. Independent of [`SyncStatus`]: a record
/// can be `Completed` while its last save is still waiting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Assigned,
    Draft,
    ToSync,
    Completed,
}

/// Replication state of the latest local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

/// How a survey form was saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    Draft,
    ReadyToSync,
    Submit,
}

impl SaveMode {
    pub fn record_status(&self) -> RecordStatus {
        match self {
            SaveMode::Draft => RecordStatus::Draft,
            SaveMode::ReadyToSync => RecordStatus::ToSync,
            SaveMode::Submit => RecordStatus::Completed,
        }
    }
}

/// A consumer survey row as stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerRecord {
    pub id: i64,
    pub consumer_id: String,

    // Imported from the assignment, read-only in the forms.
    pub consumer_name: Option<String>,
    pub father_name: Option<String>,
    pub address: Option<String>,
    pub mobile_number: Option<String>,
    pub division: Option<String>,
    pub sub_division: Option<String>,
    pub section: Option<String>,
    pub feeder_name: Option<String>,
    pub dt_code: Option<String>,
    pub pole_number: Option<String>,
    pub meter_number: Option<String>,
    pub meter_make: Option<String>,
    pub sanctioned_load: Option<f64>,
    pub tariff_category: Option<String>,
    pub connection_type: Option<String>,

    // Captured by the surveyor.
    pub survey_meter_number: Option<String>,
    pub meter_reading: Option<f64>,
    pub meter_status: Option<String>,
    pub premise_type: Option<String>,
    pub occupancy_status: Option<String>,
    pub remarks: Option<String>,

    // Merged in from photo captures.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub gps_accuracy: Option<f64>,
    pub network_type: Option<String>,
    pub network_strength: Option<String>,

    pub status: RecordStatus,
    pub sync_status: SyncStatus,

    pub created_on: String,
    pub modified_on: String,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub last_synced_on: Option<String>,
}

/// A consumer as delivered by the assignment import, or registered in the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewConsumerRecord {
    pub consumer_id: String,
    pub consumer_name: Option<String>,
    pub father_name: Option<String>,
    pub address: Option<String>,
    pub mobile_number: Option<String>,
    pub division: Option<String>,
    pub sub_division: Option<String>,
    pub section: Option<String>,
    pub feeder_name: Option<String>,
    pub dt_code: Option<String>,
    pub pole_number: Option<String>,
    pub meter_number: Option<String>,
    pub meter_make: Option<String>,
    pub sanctioned_load: Option<f64>,
    pub tariff_category: Option<String>,
    pub connection_type: Option<String>,
    pub created_by: Option<String>,
}

/// Editable survey fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurveyUpdate {
    pub survey_meter_number: Option<String>,
    pub meter_reading: Option<f64>,
    pub meter_status: Option<String>,
    pub premise_type: Option<String>,
    pub occupancy_status: Option<String>,
    pub remarks: Option<String>,
}

impl SurveyUpdate {
    pub fn is_empty(&self) -> bool {
        self == &SurveyUpdate::default()
    }
}

/// Filter keys understood by [`RecordFilter`]. Anything else is ignored.
pub const CONSUMER_FILTER_KEYS: [&str; 12] = [
    "consumer_id",
    "status",
    "sync_status",
    "division",
    "sub_division",
    "section",
    "feeder_name",
    "dt_code",
    "meter_number",
    "created_by",
    "modified_by",
    "search",
];

/// Equality predicates keyed by column name, plus a free-text `search`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordFilter(pub BTreeMap<String, String>);

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Keys that will be dropped when the filter is applied.
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|key| !CONSUMER_FILTER_KEYS.contains(key))
            .collect()
    }
}
