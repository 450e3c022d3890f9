//! Canonical telemetry domain types.

mod job_log;
mod models;

pub use job_log::{
    derive_status, JobExecutionLog, JobExecutionSummary, VehicleError, MAX_RECORDED_ERRORS,
};
pub use models::{
    ConsumptionData, DataQuality, EngineStatus, EventType, GeoLocation, IgnitionStatus,
    IngestionMetadata, IngestionStatus, ParkingEvent, Reading, ReportType, SearchType,
    SwitchState, TripSummary, Vehicle, VehicleTelemetry, VoltageReading,
};
