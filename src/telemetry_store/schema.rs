//! SQLite schema for vehicles, telemetry records and job execution logs.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1
// =============================================================================

const VEHICLES_TABLE_V1: Table = Table {
    name: "vehicles",
    columns: &[
        sqlite_column!("vin", &SqlType::Text, is_primary_key = true),
        sqlite_column!("vehicle_name", &SqlType::Text),
        sqlite_column!("make", &SqlType::Text),
        sqlite_column!("model", &SqlType::Text),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("license_plate", &SqlType::Text),
        sqlite_column!("fleet_id", &SqlType::Text),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_vehicles_active", "is_active")],
};

/// Canonical records. The full record is kept as JSON in `record`; the other
/// columns exist for filtering.
const TELEMETRY_RECORDS_TABLE_V1: Table = Table {
    name: "telemetry_records",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("vin", &SqlType::Text, non_null = true),
        sqlite_column!("vehicle_name", &SqlType::Text),
        sqlite_column!("report_type", &SqlType::Text, non_null = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("provider_name", &SqlType::Text, non_null = true),
        sqlite_column!("quality", &SqlType::Text, non_null = true),
        sqlite_column!("recorded_at", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("record", &SqlType::Text, non_null = true), // JSON
    ],
    indices: &[
        ("idx_telemetry_vin_recorded", "vin, recorded_at DESC"),
        ("idx_telemetry_event_recorded", "event_type, recorded_at DESC"),
        ("idx_telemetry_report_type", "report_type"),
        ("idx_telemetry_created", "created_at"),
    ],
};

const JOB_EXECUTION_LOGS_TABLE_V1: Table = Table {
    name: "job_execution_logs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("job_name", &SqlType::Text, non_null = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("start_time", &SqlType::Text, non_null = true),
        sqlite_column!("end_time", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("vehicles_processed", &SqlType::Integer, non_null = true),
        sqlite_column!("vehicles_succeeded", &SqlType::Integer, non_null = true),
        sqlite_column!("vehicles_failed", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_seconds", &SqlType::Real),
        sqlite_column!("success_rate", &SqlType::Real, non_null = true),
        sqlite_column!("error_summary", &SqlType::Text), // JSON
        sqlite_column!("execution_metadata", &SqlType::Text, non_null = true), // JSON
    ],
    indices: &[
        ("idx_job_logs_name_start", "job_name, start_time DESC"),
        ("idx_job_logs_status", "status"),
    ],
};

pub const TELEMETRY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        VEHICLES_TABLE_V1,
        TELEMETRY_RECORDS_TABLE_V1,
        JOB_EXECUTION_LOGS_TABLE_V1,
    ],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_v1_schema_creates_successfully() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = &TELEMETRY_VERSIONED_SCHEMAS[0];
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();
    }

    #[test]
    fn test_telemetry_indices_created() {
        let conn = Connection::open_in_memory().unwrap();
        TELEMETRY_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND tbl_name='telemetry_records' AND name LIKE 'idx_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }
}
