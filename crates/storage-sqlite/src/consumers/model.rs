//! Database models for consumer survey records.

use diesel::prelude::*;

use fieldsync_core::consumers::{ConsumerRecord, NewConsumerRecord, RecordStatus, SurveyUpdate, SyncStatus};
use fieldsync_core::errors::{Error, Result};

use crate::db::{enum_from_db, enum_to_db};

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::consumer_indexing)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConsumerRecordDB {
    pub id: i64,
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
    pub survey_meter_number: Option<String>,
    pub meter_reading: Option<f64>,
    pub meter_status: Option<String>,
    pub premise_type: Option<String>,
    pub occupancy_status: Option<String>,
    pub remarks: Option<String>,
    pub status: String,
    pub sync_status: String,
    pub created_on: String,
    pub modified_on: String,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub last_synced_on: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub gps_accuracy: Option<f64>,
    pub network_type: Option<String>,
    pub network_strength: Option<String>,
}

impl TryFrom<ConsumerRecordDB> for ConsumerRecord {
    type Error = Error;

    fn try_from(row: ConsumerRecordDB) -> Result<Self> {
        let status: RecordStatus = enum_from_db(&row.status)?;
        let sync_status: SyncStatus = enum_from_db(&row.sync_status)?;
        Ok(Self {
            id: row.id,
            consumer_id: row.consumer_id,
            consumer_name: row.consumer_name,
            father_name: row.father_name,
            address: row.address,
            mobile_number: row.mobile_number,
            division: row.division,
            sub_division: row.sub_division,
            section: row.section,
            feeder_name: row.feeder_name,
            dt_code: row.dt_code,
            pole_number: row.pole_number,
            meter_number: row.meter_number,
            meter_make: row.meter_make,
            sanctioned_load: row.sanctioned_load,
            tariff_category: row.tariff_category,
            connection_type: row.connection_type,
            survey_meter_number: row.survey_meter_number,
            meter_reading: row.meter_reading,
            meter_status: row.meter_status,
            premise_type: row.premise_type,
            occupancy_status: row.occupancy_status,
            remarks: row.remarks,
            latitude: row.latitude,
            longitude: row.longitude,
            gps_accuracy: row.gps_accuracy,
            network_type: row.network_type,
            network_strength: row.network_strength,
            status,
            sync_status,
            created_on: row.created_on,
            modified_on: row.modified_on,
            created_by: row.created_by,
            modified_by: row.modified_by,
            last_synced_on: row.last_synced_on,
        })
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::consumer_indexing)]
pub struct NewConsumerRecordDB {
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
    pub status: String,
    pub sync_status: String,
    pub created_on: String,
    pub modified_on: String,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub last_synced_on: Option<String>,
}

impl NewConsumerRecordDB {
    pub fn from_domain(
        record: NewConsumerRecord,
        status: RecordStatus,
        sync_status: SyncStatus,
        now: &str,
    ) -> Result<Self> {
        Ok(Self {
            consumer_id: record.consumer_id.trim().to_string(),
            consumer_name: record.consumer_name,
            father_name: record.father_name,
            address: record.address,
            mobile_number: record.mobile_number,
            division: record.division,
            sub_division: record.sub_division,
            section: record.section,
            feeder_name: record.feeder_name,
            dt_code: record.dt_code,
            pole_number: record.pole_number,
            meter_number: record.meter_number,
            meter_make: record.meter_make,
            sanctioned_load: record.sanctioned_load,
            tariff_category: record.tariff_category,
            connection_type: record.connection_type,
            status: enum_to_db(&status)?,
            sync_status: enum_to_db(&sync_status)?,
            created_on: now.to_string(),
            modified_on: now.to_string(),
            modified_by: record.created_by.clone(),
            created_by: record.created_by,
            // A row born synced came from the remote, so it already exists there.
            last_synced_on: (sync_status == SyncStatus::Synced).then(|| now.to_string()),
        })
    }

    /// Columns an import is allowed to overwrite on an existing row.
    pub fn imported_fields(&self) -> ImportedFieldsDB {
        ImportedFieldsDB {
            consumer_name: self.consumer_name.clone(),
            father_name: self.father_name.clone(),
            address: self.address.clone(),
            mobile_number: self.mobile_number.clone(),
            division: self.division.clone(),
            sub_division: self.sub_division.clone(),
            section: self.section.clone(),
            feeder_name: self.feeder_name.clone(),
            dt_code: self.dt_code.clone(),
            pole_number: self.pole_number.clone(),
            meter_number: self.meter_number.clone(),
            meter_make: self.meter_make.clone(),
            sanctioned_load: self.sanctioned_load,
            tariff_category: self.tariff_category.clone(),
            connection_type: self.connection_type.clone(),
            modified_on: self.modified_on.clone(),
        }
    }
}

/// Assignment data refreshed by a re-import. Survey progress is left alone.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::consumer_indexing)]
#[diesel(treat_none_as_null = true)]
pub struct ImportedFieldsDB {
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
    pub modified_on: String,
}

/// Survey edits plus the bookkeeping every save touches. `None` survey fields
/// are skipped so partial forms never erase earlier answers.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::consumer_indexing)]
pub struct SurveyChangesetDB {
    pub survey_meter_number: Option<String>,
    pub meter_reading: Option<f64>,
    pub meter_status: Option<String>,
    pub premise_type: Option<String>,
    pub occupancy_status: Option<String>,
    pub remarks: Option<String>,
    pub status: String,
    pub sync_status: String,
    pub modified_on: String,
    pub modified_by: Option<String>,
}

impl SurveyChangesetDB {
    pub fn new(update: SurveyUpdate, status: RecordStatus, user: String, now: String) -> Result<Self> {
        Ok(Self {
            survey_meter_number: update.survey_meter_number,
            meter_reading: update.meter_reading,
            meter_status: update.meter_status,
            premise_type: update.premise_type,
            occupancy_status: update.occupancy_status,
            remarks: update.remarks,
            status: enum_to_db(&status)?,
            sync_status: enum_to_db(&SyncStatus::Pending)?,
            modified_on: now,
            modified_by: Some(user),
        })
    }
}
