use super::job::JobOutcome;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, info, warn};

/// Something that happened to a scheduled fire.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Executed {
        job_id: String,
        outcome: JobOutcome,
        duration: Duration,
    },
    Failed {
        job_id: String,
        error: String,
        duration: Duration,
    },
    /// Fire dropped because the previous execution was still running.
    Skipped {
        job_id: String,
        scheduled_for: DateTime<Utc>,
    },
    /// Fire dropped because it was later than the misfire grace time.
    Missed {
        job_id: String,
        scheduled_for: DateTime<Utc>,
        lateness: Duration,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Executed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Skipped { job_id, .. }
            | JobEvent::Missed { job_id, .. } => job_id,
        }
    }
}

/// Observer of job executions. Listeners never influence scheduling.
pub trait ExecutionListener: Send + Sync {
    fn on_event(&self, event: &JobEvent);
}

/// Writes every event to the log.
pub struct LoggingListener;

impl ExecutionListener for LoggingListener {
    fn on_event(&self, event: &JobEvent) {
        match event {
            JobEvent::Executed {
                job_id,
                outcome,
                duration,
            } => info!("Job {} finished as {:?} in {:?}", job_id, outcome, duration),
            JobEvent::Failed {
                job_id,
                error,
                duration,
            } => error!("Job {} failed after {:?}: {}", job_id, duration, error),
            JobEvent::Skipped {
                job_id,
                scheduled_for,
            } => warn!(
                "Skipped {} fire at {}: previous run still in progress",
                job_id, scheduled_for
            ),
            JobEvent::Missed {
                job_id,
                scheduled_for,
                lateness,
            } => warn!(
                "Missed {} fire at {} by {:?}, beyond the misfire grace time",
                job_id, scheduled_for, lateness
            ),
        }
    }
}
