//! Scheduled telemetry collection.
//!
//! Each built-in collection definition becomes one `CollectionTask`. On every fire
//! the active VINs are read from the vehicle directory and handed to a
//! `CollectionJob` for its report type.

use crate::background_jobs::{
    context::JobContext,
    cron::CronSchedule,
    job::{JobError, JobOutcome, ScheduledJob},
};
use crate::collection::{CollectionJob, CollectionJobSpec, CollectionOptions};
use crate::telemetry::JobExecutionLog;
use async_trait::async_trait;
use tracing::{error, info};

/// A collection job bound to its cron schedule.
pub struct CollectionTask {
    spec: &'static CollectionJobSpec,
    schedule: CronSchedule,
}

impl CollectionTask {
    pub fn new(spec: &'static CollectionJobSpec, cron: &str) -> Result<Self, JobError> {
        Ok(Self {
            spec,
            schedule: CronSchedule::parse(cron)?,
        })
    }

    pub fn spec(&self) -> &'static CollectionJobSpec {
        self.spec
    }

    /// Record a run that could not start.
    fn persist_failure(&self, ctx: &JobContext, message: &str) {
        let mut log = JobExecutionLog::new(self.spec.id, self.spec.report_type.as_str());
        log.mark_running();
        log.fail_critically(message);
        if let Err(e) = ctx.telemetry_store.insert_job_log(&log) {
            error!("Failed to persist execution log for {}: {}", self.spec.id, e);
        }
    }
}

#[async_trait]
impl ScheduledJob for CollectionTask {
    fn id(&self) -> &'static str {
        self.spec.id
    }

    fn name(&self) -> &'static str {
        self.spec.name
    }

    fn description(&self) -> &'static str {
        self.spec.description
    }

    fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    async fn execute(&self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let vins = match ctx.vehicle_directory.list_active_vins() {
            Ok(vins) => vins,
            Err(e) => {
                let message = format!("Failed to load active vehicles: {}", e);
                error!("{}: {}", self.spec.id, message);
                self.persist_failure(ctx, &message);
                return Err(JobError::ExecutionFailed(message));
            }
        };

        let job = CollectionJob::new(
            self.spec.id,
            self.spec.report_type,
            ctx.provider.clone(),
            ctx.telemetry_store.clone(),
            CollectionOptions::from_config(&ctx.config, self.spec.inspector),
        );
        let log = job.run(&vins, ctx.cancellation_token.clone()).await;

        if ctx.is_cancelled() {
            info!("{} stopped early by shutdown", self.spec.id);
            return Err(JobError::Cancelled);
        }

        Ok(JobOutcome::from(log.status))
    }
}
