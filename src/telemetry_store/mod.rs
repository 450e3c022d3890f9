//! Persistence contracts for telemetry, job logs and the vehicle directory.

mod models;
mod schema;
mod seed;
mod sqlite_telemetry_store;

pub use models::{JobStatistics, TelemetryStatistics};
pub use schema::TELEMETRY_VERSIONED_SCHEMAS;
pub use seed::seed_mock_fleet;
pub use sqlite_telemetry_store::SqliteTelemetryStore;

use crate::telemetry::{
    EventType, JobExecutionLog, ReportType, Vehicle, VehicleTelemetry,
};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait TelemetryStore: Send + Sync {
    // Telemetry records
    fn insert_one(&self, record: &VehicleTelemetry) -> Result<String>;
    /// Insert all records atomically. Returns the new ids in input order.
    fn insert_many(&self, records: &[VehicleTelemetry]) -> Result<Vec<String>>;
    /// Newest `recorded_at` first.
    fn find_by_vin(
        &self,
        vin: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VehicleTelemetry>>;
    fn find_by_event_type(
        &self,
        event_type: EventType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VehicleTelemetry>>;
    fn latest_by_vin_and_report_type(
        &self,
        vin: &str,
        report_type: ReportType,
    ) -> Result<Option<VehicleTelemetry>>;
    fn statistics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<TelemetryStatistics>;
    /// Delete records ingested before `cutoff`. Returns the number removed.
    fn delete_records_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    // Job execution logs
    fn insert_job_log(&self, log: &JobExecutionLog) -> Result<i64>;
    fn update_job_log(&self, id: i64, log: &JobExecutionLog) -> Result<()>;
    /// Newest first.
    fn recent_job_logs(&self, job_name: &str, limit: usize) -> Result<Vec<JobExecutionLog>>;
    fn job_statistics(&self) -> Result<Vec<JobStatistics>>;
    fn delete_job_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

pub trait VehicleDirectory: Send + Sync {
    fn list_active_vins(&self) -> Result<Vec<String>> {
        self.all_vins(true)
    }
    fn all_vins(&self, active_only: bool) -> Result<Vec<String>>;
    fn find_vehicle(&self, vin: &str) -> Result<Option<Vehicle>>;
    /// Insert or replace the vehicle's master data, keeping its creation time.
    fn upsert_vehicle(&self, vehicle: &Vehicle) -> Result<()>;
    /// Returns false if the VIN is unknown.
    fn set_active(&self, vin: &str, active: bool) -> Result<bool>;
    fn count_vehicles(&self, active_only: bool) -> Result<usize>;
}
