use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate counts over stored telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryStatistics {
    pub total_records: u64,
    pub unique_vehicle_count: u64,
    /// Record count per report type wire name.
    pub report_types: BTreeMap<String, u64>,
    /// Record count per event type.
    pub event_types: BTreeMap<String, u64>,
}

/// Per-job aggregates over the execution log history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatistics {
    pub job_name: String,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub avg_duration_seconds: f64,
    pub avg_success_rate: f64,
}

/// Round to two decimals for reporting.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
