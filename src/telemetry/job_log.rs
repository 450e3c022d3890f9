//! Execution log written once per collection run.

use super::models::IngestionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Maximum number of per-vehicle errors kept in an error summary.
pub const MAX_RECORDED_ERRORS: usize = 10;

/// A single per-vehicle failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleError {
    pub vin: String,
    pub error: String,
}

/// Summary of one job run.
///
/// Invariant once terminal: `vehicles_processed == vehicles_succeeded + vehicles_failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub job_name: String,
    pub job_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: IngestionStatus,
    pub vehicles_processed: u64,
    pub vehicles_succeeded: u64,
    pub vehicles_failed: u64,
    pub error_summary: Option<Value>,
    pub execution_metadata: Map<String, Value>,
}

impl JobExecutionLog {
    pub fn new(job_name: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            job_type: job_type.into(),
            start_time: Utc::now(),
            end_time: None,
            status: IngestionStatus::Pending,
            vehicles_processed: 0,
            vehicles_succeeded: 0,
            vehicles_failed: 0,
            error_summary: None,
            execution_metadata: Map::new(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = IngestionStatus::Running;
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }

    /// Percentage of processed vehicles that succeeded, 0 when nothing was processed.
    pub fn success_rate(&self) -> f64 {
        if self.vehicles_processed == 0 {
            return 0.0;
        }
        self.vehicles_succeeded as f64 / self.vehicles_processed as f64 * 100.0
    }

    pub fn failure_rate(&self) -> f64 {
        if self.vehicles_processed == 0 {
            return 0.0;
        }
        self.vehicles_failed as f64 / self.vehicles_processed as f64
    }

    /// Closes the log with the outcome of a completed run.
    ///
    /// Only the first [`MAX_RECORDED_ERRORS`] errors are kept but `total_errors`
    /// counts all of them.
    pub fn complete(
        &mut self,
        succeeded: u64,
        failed: u64,
        total_errors: usize,
        errors: &[VehicleError],
    ) {
        self.end_time = Some(Utc::now());
        self.vehicles_succeeded = succeeded;
        self.vehicles_failed = failed;
        self.vehicles_processed = succeeded + failed;
        self.status = derive_status(self.vehicles_succeeded, self.vehicles_processed);

        if total_errors > 0 {
            let kept: Vec<&VehicleError> = errors.iter().take(MAX_RECORDED_ERRORS).collect();
            self.error_summary = Some(json!({
                "total_errors": total_errors,
                "errors": kept,
            }));
        }
    }

    /// Closes the log after a failure that escaped the per-vehicle boundary.
    pub fn fail_critically(&mut self, message: impl Into<String>) {
        self.end_time = Some(Utc::now());
        self.vehicles_processed = self.vehicles_succeeded + self.vehicles_failed;
        self.status = IngestionStatus::Failed;
        self.error_summary = Some(json!({ "critical_error": message.into() }));
    }
}

/// Three-way outcome rule for a finished run.
pub fn derive_status(succeeded: u64, processed: u64) -> IngestionStatus {
    if processed > 0 && succeeded == processed {
        IngestionStatus::Success
    } else if succeeded > 0 {
        IngestionStatus::PartialSuccess
    } else {
        IngestionStatus::Failed
    }
}

/// Read model of a stored log, as listed in job history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobExecutionSummary {
    pub job_name: String,
    pub status: IngestionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub vehicles_processed: u64,
    pub vehicles_succeeded: u64,
    pub vehicles_failed: u64,
    pub success_rate: f64,
    pub duration_seconds: Option<f64>,
}

impl From<&JobExecutionLog> for JobExecutionSummary {
    fn from(log: &JobExecutionLog) -> Self {
        Self {
            job_name: log.job_name.clone(),
            status: log.status,
            start_time: log.start_time,
            end_time: log.end_time,
            vehicles_processed: log.vehicles_processed,
            vehicles_succeeded: log.vehicles_succeeded,
            vehicles_failed: log.vehicles_failed,
            success_rate: log.success_rate(),
            duration_seconds: log.duration_seconds(),
        }
    }
}
