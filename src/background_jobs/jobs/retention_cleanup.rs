//! Retention cleanup background job.
//!
//! Deletes telemetry records and execution logs older than their configured
//! retention periods.

use crate::background_jobs::{
    context::JobContext,
    cron::CronSchedule,
    job::{JobError, JobOutcome, ScheduledJob},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

pub const RETENTION_CLEANUP_JOB_ID: &str = "retention_cleanup";

pub struct RetentionCleanupJob {
    schedule: CronSchedule,
    telemetry_retention_days: u64,
    job_log_retention_days: u64,
}

impl RetentionCleanupJob {
    pub fn new(
        cron: &str,
        telemetry_retention_days: u64,
        job_log_retention_days: u64,
    ) -> Result<Self, JobError> {
        Ok(Self {
            schedule: CronSchedule::parse(cron)?,
            telemetry_retention_days,
            job_log_retention_days,
        })
    }
}

#[async_trait]
impl ScheduledJob for RetentionCleanupJob {
    fn id(&self) -> &'static str {
        RETENTION_CLEANUP_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Retention Cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete telemetry and execution logs past their retention period"
    }

    fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    async fn execute(&self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let now = Utc::now();
        let telemetry_cutoff = now - Duration::days(self.telemetry_retention_days as i64);
        let job_log_cutoff = now - Duration::days(self.job_log_retention_days as i64);

        info!(
            "Cleaning up telemetry older than {} days and job logs older than {} days",
            self.telemetry_retention_days, self.job_log_retention_days
        );

        let deleted_records = ctx
            .telemetry_store
            .delete_records_before(telemetry_cutoff)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        let deleted_logs = ctx
            .telemetry_store
            .delete_job_logs_before(job_log_cutoff)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if deleted_records > 0 || deleted_logs > 0 {
            info!(
                "Deleted {} telemetry records and {} job logs",
                deleted_records, deleted_logs
            );
        } else {
            info!("Nothing to clean up");
        }

        Ok(JobOutcome::Succeeded)
    }
}
