use super::context::JobContext;
use super::cron::CronSchedule;
use crate::telemetry::IngestionStatus;
use async_trait::async_trait;
use serde::Serialize;

/// How a finished execution went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    PartiallySucceeded,
    Failed,
}

impl From<IngestionStatus> for JobOutcome {
    fn from(status: IngestionStatus) -> Self {
        match status {
            IngestionStatus::Success => JobOutcome::Succeeded,
            IngestionStatus::PartialSuccess => JobOutcome::PartiallySucceeded,
            _ => JobOutcome::Failed,
        }
    }
}

/// Lifecycle of a registered job.
///
/// `Scheduled -> Triggered -> Running -> Scheduled` on every fire, with the
/// terminal outcome kept as the job's last result. `Paused` is entered from
/// `Scheduled` and left on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Triggered,
    Running,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Paused,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Scheduled => "scheduled",
            JobState::Triggered => "triggered",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::PartiallySucceeded => "partially_succeeded",
            JobState::Failed => "failed",
            JobState::Paused => "paused",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Triggered | JobState::Running)
    }
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::PartiallySucceeded => JobState::PartiallySucceeded,
            JobOutcome::Failed => JobState::Failed,
        }
    }
}

/// Errors from the scheduler or from a job execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobError {
    NotFound,
    AlreadyRunning,
    AlreadyExists,
    Paused,
    InvalidSchedule(String),
    ExecutionFailed(String),
    Cancelled,
    SchedulerUnavailable,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::AlreadyRunning => write!(f, "Job is already running"),
            JobError::AlreadyExists => write!(f, "Job already exists"),
            JobError::Paused => write!(f, "Job is paused"),
            JobError::InvalidSchedule(msg) => write!(f, "Invalid schedule: {}", msg),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
            JobError::SchedulerUnavailable => write!(f, "Scheduler not available"),
        }
    }
}

impl std::error::Error for JobError {}

/// Trait for cron-scheduled jobs.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    fn schedule(&self) -> &CronSchedule;

    /// Execute the job.
    ///
    /// Long-running implementations should check `ctx.is_cancelled()` and
    /// return `JobError::Cancelled` when it is set.
    async fn execute(&self, ctx: &JobContext) -> Result<JobOutcome, JobError>;
}
