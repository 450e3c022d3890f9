use super::job::{JobError, JobState, ScheduledJob};
use crate::telemetry::JobExecutionSummary;
use crate::telemetry_store::{JobStatistics, TelemetryStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Information about a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cron: String,
    pub state: JobState,
    pub paused: bool,
    pub is_running: bool,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Terminal state of the last execution.
    pub last_outcome: Option<JobState>,
}

/// Scheduler bookkeeping for one job id.
pub struct JobEntry {
    pub job: Arc<dyn ScheduledJob>,
    pub state: JobState,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<JobState>,
    /// Pause requested while running; applied when the run finishes.
    pub pause_requested: bool,
}

impl JobEntry {
    pub fn new(job: Arc<dyn ScheduledJob>, now: DateTime<Utc>) -> Self {
        let next_fire_at = job.schedule().next_after(now);
        Self {
            job,
            state: JobState::Scheduled,
            next_fire_at,
            last_run_at: None,
            last_outcome: None,
            pause_requested: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    fn info(&self, job_id: &str) -> JobInfo {
        JobInfo {
            id: job_id.to_string(),
            name: self.job.name().to_string(),
            description: self.job.description().to_string(),
            cron: self.job.schedule().expression().to_string(),
            state: self.state,
            paused: self.state == JobState::Paused || self.pause_requested,
            is_running: self.is_running(),
            next_fire_at: self.next_fire_at,
            last_run_at: self.last_run_at,
            last_outcome: self.last_outcome,
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    AddJob {
        job: Arc<dyn ScheduledJob>,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    RemoveJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    PauseJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    ResumeJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    Shutdown {
        wait: bool,
        response: oneshot::Sender<()>,
    },
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    pub jobs: HashMap<String, JobEntry>,
}

/// Handle to interact with the job scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    /// Channel to send commands to the scheduler
    command_tx: mpsc::Sender<SchedulerCommand>,
    /// Shared state for reading job info
    shared_state: Arc<RwLock<SharedJobState>>,
    /// Store for job history queries
    telemetry_store: Arc<dyn TelemetryStore>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        telemetry_store: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            telemetry_store,
        }
    }

    /// Get information about all registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(job_id, entry)| entry.info(job_id))
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let state = self.shared_state.read().await;
        state.jobs.get(job_id).map(|entry| entry.info(job_id))
    }

    pub async fn is_job_running(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.jobs.get(job_id).is_some_and(JobEntry::is_running)
    }

    pub async fn job_exists(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.jobs.contains_key(job_id)
    }

    pub async fn add_job(&self, job: Arc<dyn ScheduledJob>) -> Result<(), JobError> {
        self.request(|response| SchedulerCommand::AddJob { job, response })
            .await
    }

    /// Unschedule a job. An execution already in progress is left to finish.
    pub async fn remove_job(&self, job_id: &str) -> Result<(), JobError> {
        let job_id = job_id.to_string();
        self.request(|response| SchedulerCommand::RemoveJob { job_id, response })
            .await
    }

    pub async fn pause_job(&self, job_id: &str) -> Result<(), JobError> {
        let job_id = job_id.to_string();
        self.request(|response| SchedulerCommand::PauseJob { job_id, response })
            .await
    }

    pub async fn resume_job(&self, job_id: &str) -> Result<(), JobError> {
        let job_id = job_id.to_string();
        self.request(|response| SchedulerCommand::ResumeJob { job_id, response })
            .await
    }

    /// Trigger a job manually, outside its cron schedule.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let job_id = job_id.to_string();
        self.request(|response| SchedulerCommand::TriggerJob { job_id, response })
            .await
    }

    /// Stop the scheduler. With `wait`, returns only after running jobs finish.
    pub async fn shutdown(&self, wait: bool) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::Shutdown {
                wait,
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::SchedulerUnavailable)?;
        response_rx.await.map_err(|_| JobError::SchedulerUnavailable)
    }

    /// Most recent execution logs of a job, newest first.
    pub fn job_history(&self, job_name: &str, limit: usize) -> Result<Vec<JobExecutionSummary>> {
        let logs = self.telemetry_store.recent_job_logs(job_name, limit)?;
        Ok(logs.iter().map(JobExecutionSummary::from).collect())
    }

    pub fn job_statistics(&self) -> Result<Vec<JobStatistics>> {
        self.telemetry_store.job_statistics()
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), JobError>>) -> SchedulerCommand,
    ) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(command(response_tx))
            .await
            .map_err(|_| JobError::SchedulerUnavailable)?;

        response_rx
            .await
            .map_err(|_| JobError::SchedulerUnavailable)?
    }
}
