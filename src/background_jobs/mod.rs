//! Cron job scheduling and execution.
//!
//! Jobs fire on 5-field cron schedules evaluated in UTC. At most one
//! execution of a job runs at a time; fires that arrive while it is running
//! are skipped, and fires later than the misfire grace time are dropped.

mod context;
mod cron;
mod handle;
mod job;
pub mod jobs;
mod listener;
mod scheduler;

pub use context::JobContext;
pub use cron::CronSchedule;
pub use handle::{JobInfo, SchedulerHandle};
pub use job::{JobError, JobOutcome, JobState, ScheduledJob};
pub use jobs::{build_jobs, CollectionTask, RetentionCleanupJob, RETENTION_CLEANUP_JOB_ID};
pub use listener::{ExecutionListener, JobEvent, LoggingListener};
pub use scheduler::{create_scheduler, JobScheduler};
