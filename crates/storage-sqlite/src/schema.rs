// Mirrors the schema produced by `db::migrations` at the latest version.

diesel::table! {
    schema_version (id) {
        id -> Integer,
        version -> Integer,
        updated_at -> Text,
    }
}

diesel::table! {
    consumer_indexing (id) {
        id -> BigInt,
        consumer_id -> Text,
        consumer_name -> Nullable<Text>,
        father_name -> Nullable<Text>,
        address -> Nullable<Text>,
        mobile_number -> Nullable<Text>,
        division -> Nullable<Text>,
        sub_division -> Nullable<Text>,
        section -> Nullable<Text>,
        feeder_name -> Nullable<Text>,
        dt_code -> Nullable<Text>,
        pole_number -> Nullable<Text>,
        meter_number -> Nullable<Text>,
        meter_make -> Nullable<Text>,
        sanctioned_load -> Nullable<Double>,
        tariff_category -> Nullable<Text>,
        connection_type -> Nullable<Text>,
        survey_meter_number -> Nullable<Text>,
        meter_reading -> Nullable<Double>,
        meter_status -> Nullable<Text>,
        premise_type -> Nullable<Text>,
        occupancy_status -> Nullable<Text>,
        remarks -> Nullable<Text>,
        status -> Text,
        sync_status -> Text,
        created_on -> Text,
        modified_on -> Text,
        created_by -> Nullable<Text>,
        modified_by -> Nullable<Text>,
        last_synced_on -> Nullable<Text>,
        // v2
        latitude -> Nullable<Double>,
        longitude -> Nullable<Double>,
        gps_accuracy -> Nullable<Double>,
        // v3
        network_type -> Nullable<Text>,
        network_strength -> Nullable<Text>,
        // v6
        remote_snapshot_at -> Nullable<Text>,
    }
}

diesel::table! {
    attachments (id) {
        id -> BigInt,
        record_id -> BigInt,
        attachment_type -> Text,
        uri -> Nullable<Text>,
        data -> Nullable<Binary>,
        mime_type -> Nullable<Text>,
        size_bytes -> Nullable<BigInt>,
        created_at -> Text,
        updated_at -> Text,
        // v4
        upload_status -> Text,
        upload_attempts -> Integer,
        last_error -> Nullable<Text>,
        uploaded_at -> Nullable<Text>,
    }
}

diesel::table! {
    dashboard_counters (bucket) {
        bucket -> Text,
        value -> BigInt,
        updated_at -> Text,
    }
}

diesel::table! {
    sync_queue (id) {
        id -> BigInt,
        table_name -> Text,
        record_id -> BigInt,
        action -> Text,
        payload -> Text,
        priority -> Integer,
        retry_count -> Integer,
        created_at -> Text,
        // v4
        last_error -> Nullable<Text>,
    }
}

diesel::table! {
    sync_engine_state (id) {
        id -> Integer,
        last_sync_at -> Nullable<Text>,
        last_cycle_status -> Nullable<Text>,
        last_synced_records -> BigInt,
        last_error_records -> BigInt,
        last_total_records -> BigInt,
        last_dropped_records -> BigInt,
        total_dropped_records -> BigInt,
        consecutive_failures -> Integer,
        last_error -> Nullable<Text>,
        last_cycle_duration_ms -> Nullable<BigInt>,
    }
}

diesel::table! {
    sync_dead_letters (id) {
        id -> BigInt,
        queue_entry_id -> BigInt,
        table_name -> Text,
        record_id -> BigInt,
        action -> Text,
        payload -> Text,
        priority -> Integer,
        retry_count -> Integer,
        reason -> Text,
        created_at -> Text,
        dropped_at -> Text,
    }
}

diesel::joinable!(attachments -> consumer_indexing (record_id));

diesel::allow_tables_to_appear_in_same_query!(
    schema_version,
    consumer_indexing,
    attachments,
    dashboard_counters,
    sync_queue,
    sync_engine_state,
    sync_dead_letters,
);
