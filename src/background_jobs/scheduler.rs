use super::context::JobContext;
use super::cron::CronSchedule;
use super::handle::{JobEntry, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{JobError, JobState, ScheduledJob};
use super::listener::{ExecutionListener, JobEvent};
use crate::config::SchedulerSettings;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on how long the loop sleeps without re-checking due jobs.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Cap on fire times walked while coalescing missed fires.
const MAX_COALESCED_FIRES: usize = 100_000;

/// Manages cron job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles (not shared, managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Parent of every run's cancellation token. Only a non-waiting
    /// shutdown cancels it, so stopping the loop leaves running jobs alone.
    jobs_token: CancellationToken,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,

    listener: Arc<dyn ExecutionListener>,

    misfire_grace: chrono::Duration,

    /// Whether a shutdown signalled through `shutdown_token` waits for running jobs.
    shutdown_wait: bool,
}

impl JobScheduler {
    fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
        listener: Arc<dyn ExecutionListener>,
        settings: &SchedulerSettings,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            jobs_token: CancellationToken::new(),
            command_receiver,
            shutdown_token,
            job_context,
            listener,
            misfire_grace: chrono::Duration::seconds(settings.misfire_grace_secs as i64),
            shutdown_wait: settings.shutdown_wait,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn ScheduledJob>) -> Result<(), JobError> {
        let job_id = job.id().to_string();
        let mut state = self.shared_state.write().await;
        if state.jobs.contains_key(&job_id) {
            return Err(JobError::AlreadyExists);
        }
        // A removed job may still be finishing its last run.
        if self.has_live_run(&job_id) {
            return Err(JobError::AlreadyRunning);
        }
        info!(
            "Registering job: {} ({}) - {}",
            job_id,
            job.schedule(),
            job.description()
        );
        state.jobs.insert(job_id, JobEntry::new(job, Utc::now()));
        Ok(())
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns once the scheduler has shut down.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            // Clean up completed job handles
            self.cleanup_completed_jobs();

            let sleep_duration = self.time_until_next_fire(Utc::now()).await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs(Utc::now()).await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    if let SchedulerCommand::Shutdown { wait, response } = cmd {
                        self.shutdown(wait).await;
                        let _ = response.send(());
                        break;
                    }
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown(self.shutdown_wait).await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Handle a command from the SchedulerHandle.
    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::AddJob { job, response } => {
                let _ = response.send(self.register_job(job).await);
            }
            SchedulerCommand::RemoveJob { job_id, response } => {
                let _ = response.send(self.remove_job(&job_id).await);
            }
            SchedulerCommand::PauseJob { job_id, response } => {
                let _ = response.send(self.pause_job(&job_id).await);
            }
            SchedulerCommand::ResumeJob { job_id, response } => {
                let _ = response.send(self.resume_job(&job_id).await);
            }
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
            SchedulerCommand::Shutdown { response, .. } => {
                // Handled by the run loop.
                let _ = response.send(());
            }
        }
    }

    async fn remove_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let mut state = self.shared_state.write().await;
        match state.jobs.remove(job_id) {
            Some(_) => {
                info!("Removed job: {}", job_id);
                Ok(())
            }
            None => Err(JobError::NotFound),
        }
    }

    async fn pause_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let mut state = self.shared_state.write().await;
        let entry = state.jobs.get_mut(job_id).ok_or(JobError::NotFound)?;
        if entry.is_running() {
            info!("Job {} will pause after the current run", job_id);
            entry.pause_requested = true;
        } else if entry.state != JobState::Paused {
            info!("Paused job: {}", job_id);
            entry.state = JobState::Paused;
        }
        Ok(())
    }

    async fn resume_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let mut state = self.shared_state.write().await;
        let entry = state.jobs.get_mut(job_id).ok_or(JobError::NotFound)?;
        entry.pause_requested = false;
        if entry.state == JobState::Paused {
            entry.state = JobState::Scheduled;
            entry.next_fire_at = entry.job.schedule().next_after(Utc::now());
            info!("Resumed job: {}", job_id);
        }
        Ok(())
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        {
            let state = self.shared_state.read().await;
            let entry = state.jobs.get(job_id).ok_or(JobError::NotFound)?;
            if entry.is_running() || self.has_live_run(job_id) {
                return Err(JobError::AlreadyRunning);
            }
            if entry.state == JobState::Paused {
                return Err(JobError::Paused);
            }
        }

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    /// Time until the earliest fire among unpaused jobs.
    async fn time_until_next_fire(&self, now: DateTime<Utc>) -> Duration {
        let state = self.shared_state.read().await;
        let mut min_duration = MAX_SLEEP;

        for entry in state.jobs.values() {
            if entry.state == JobState::Paused {
                continue;
            }
            if let Some(next_fire) = entry.next_fire_at {
                if next_fire <= now {
                    return Duration::ZERO;
                }
                let duration = (next_fire - now).to_std().unwrap_or(Duration::ZERO);
                min_duration = min_duration.min(duration);
            }
        }

        min_duration
    }

    /// Fire every job whose next fire time has passed.
    ///
    /// Missed fires collapse into the latest one. A fire later than the
    /// misfire grace time is dropped, and so is a fire for a job that is
    /// still running.
    async fn run_due_jobs(&mut self, now: DateTime<Utc>) {
        let mut jobs_to_run = Vec::new();
        let mut events = Vec::new();

        {
            let mut state = self.shared_state.write().await;
            for (job_id, entry) in state.jobs.iter_mut() {
                if entry.state == JobState::Paused {
                    continue;
                }
                let Some(next_fire) = entry.next_fire_at else {
                    continue;
                };
                if next_fire > now {
                    continue;
                }

                let schedule = entry.job.schedule();
                let scheduled_for = latest_fire_due(schedule, next_fire, now);
                entry.next_fire_at = schedule.next_after(now);

                let lateness = now - scheduled_for;
                if lateness > self.misfire_grace {
                    events.push(JobEvent::Missed {
                        job_id: job_id.clone(),
                        scheduled_for,
                        lateness: lateness.to_std().unwrap_or_default(),
                    });
                    continue;
                }
                if entry.is_running() || self.has_live_run(job_id) {
                    events.push(JobEvent::Skipped {
                        job_id: job_id.clone(),
                        scheduled_for,
                    });
                    continue;
                }
                jobs_to_run.push(job_id.clone());
            }
        }

        for event in &events {
            self.listener.on_event(event);
        }
        for job_id in jobs_to_run {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Whether a task for `job_id` is still executing.
    fn has_live_run(&self, job_id: &str) -> bool {
        self.running_handles
            .get(job_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        if self.has_live_run(job_id) {
            warn!("Job {} is still running, not starting another run", job_id);
            return;
        }
        let job = {
            let mut state = self.shared_state.write().await;
            match state.jobs.get_mut(job_id) {
                Some(entry) => {
                    entry.state = JobState::Triggered;
                    Arc::clone(&entry.job)
                }
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            }
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        let ctx = self
            .job_context
            .with_cancellation_token(self.jobs_token.child_token());

        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);
        let listener = Arc::clone(&self.listener);

        let handle = tokio::spawn(async move {
            set_state(&shared_state, &job_id_owned, JobState::Running).await;

            let start_time = Instant::now();
            // Run in its own task so a panic is reported instead of unwinding here.
            let result = tokio::spawn(async move { job.execute(&ctx).await }).await;
            let duration = start_time.elapsed();

            let (terminal, event) = match result {
                Ok(Ok(outcome)) => (
                    JobState::from(outcome),
                    JobEvent::Executed {
                        job_id: job_id_owned.clone(),
                        outcome,
                        duration,
                    },
                ),
                Ok(Err(e)) => (
                    JobState::Failed,
                    JobEvent::Failed {
                        job_id: job_id_owned.clone(),
                        error: e.to_string(),
                        duration,
                    },
                ),
                Err(e) => (
                    JobState::Failed,
                    JobEvent::Failed {
                        job_id: job_id_owned.clone(),
                        error: format!("Task panic: {}", e),
                        duration,
                    },
                ),
            };

            {
                let mut state = shared_state.write().await;
                if let Some(entry) = state.jobs.get_mut(&job_id_owned) {
                    entry.last_outcome = Some(terminal);
                    entry.last_run_at = Some(Utc::now());
                    entry.state = if entry.pause_requested {
                        entry.pause_requested = false;
                        JobState::Paused
                    } else {
                        JobState::Scheduled
                    };
                }
            }

            listener.on_event(&event);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Clean up handles for completed jobs.
    fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            self.running_handles.remove(&job_id);
        }
    }

    /// Stop the scheduler, either waiting for running jobs or cancelling them.
    async fn shutdown(&mut self, wait: bool) {
        info!("Shutting down scheduler (wait: {})...", wait);

        if !wait {
            for job_id in self.running_handles.keys() {
                debug!("Cancelling job: {}", job_id);
            }
            self.jobs_token.cancel();
            self.running_handles.clear();
        }

        let pending: Vec<(String, JoinHandle<()>)> = self
            .running_handles
            .drain()
            .filter(|(_, handle)| !handle.is_finished())
            .collect();
        if !pending.is_empty() {
            info!("Waiting for {} running job(s) to complete...", pending.len());
        }
        let results = join_all(
            pending
                .into_iter()
                .map(|(job_id, handle)| async move { (job_id, handle.await) }),
        )
        .await;
        for (job_id, result) in results {
            if let Err(e) = result {
                warn!("Job {} ended abnormally during shutdown: {}", job_id, e);
            }
        }

        info!("Scheduler shutdown complete");
    }
}

async fn set_state(shared_state: &RwLock<SharedJobState>, job_id: &str, new_state: JobState) {
    let mut state = shared_state.write().await;
    if let Some(entry) = state.jobs.get_mut(job_id) {
        entry.state = new_state;
    }
}

/// The latest fire time in `first_due..=now`, where `first_due` is a fire time.
fn latest_fire_due(
    schedule: &CronSchedule,
    first_due: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut latest = first_due;
    for _ in 0..MAX_COALESCED_FIRES {
        match schedule.next_after(latest) {
            Some(next) if next <= now => latest = next,
            _ => break,
        }
    }
    latest
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    shutdown_token: CancellationToken,
    job_context: JobContext,
    listener: Arc<dyn ExecutionListener>,
    settings: &SchedulerSettings,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));
    let telemetry_store = Arc::clone(&job_context.telemetry_store);

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
        listener,
        settings,
    );

    let handle = SchedulerHandle::new(command_tx, shared_state, telemetry_store);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::job::JobOutcome;
    use crate::collection::StubProvider;
    use crate::config::AppConfig;
    use crate::telemetry::JobExecutionLog;
    use crate::telemetry_store::{SqliteTelemetryStore, TelemetryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    // Test job implementation
    struct TestJob {
        id: &'static str,
        schedule: CronSchedule,
        execution_count: Arc<AtomicUsize>,
        /// Each execution waits for one permit.
        gate: Option<Arc<Semaphore>>,
        /// Whether the last execution found its token cancelled after the gate.
        saw_cancel: Arc<AtomicBool>,
        outcome: Result<JobOutcome, JobError>,
    }

    impl TestJob {
        fn new(id: &'static str) -> Self {
            Self {
                id,
                schedule: CronSchedule::parse("* * * * *").unwrap(),
                execution_count: Arc::new(AtomicUsize::new(0)),
                gate: None,
                saw_cancel: Arc::new(AtomicBool::new(false)),
                outcome: Ok(JobOutcome::Succeeded),
            }
        }
    }

    #[async_trait]
    impl ScheduledJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> &CronSchedule {
            &self.schedule
        }

        async fn execute(&self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            self.saw_cancel.store(ctx.is_cancelled(), Ordering::SeqCst);
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            let mut log = JobExecutionLog::new(self.id, "test");
            log.complete(1, 0, 0, &[]);
            ctx.telemetry_store.insert_job_log(&log).unwrap();
            self.outcome.clone()
        }
    }

    struct PanickingJob(CronSchedule);

    #[async_trait]
    impl ScheduledJob for PanickingJob {
        fn id(&self) -> &'static str {
            "panicking_job"
        }

        fn name(&self) -> &'static str {
            "Panicking Job"
        }

        fn description(&self) -> &'static str {
            "Always panics"
        }

        fn schedule(&self) -> &CronSchedule {
            &self.0
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<JobOutcome, JobError> {
            panic!("job bug");
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<JobEvent>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<JobEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ExecutionListener for RecordingListener {
        fn on_event(&self, event: &JobEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    struct Fixture {
        scheduler: JobScheduler,
        handle: SchedulerHandle,
        listener: Arc<RecordingListener>,
        store: Arc<SqliteTelemetryStore>,
        _temp_dir: TempDir,
    }

    fn create_test_scheduler() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store =
            Arc::new(SqliteTelemetryStore::new(temp_dir.path().join("telemetry.db")).unwrap());
        let shutdown_token = CancellationToken::new();
        let job_context = JobContext::new(
            shutdown_token.child_token(),
            Arc::new(StubProvider::new(HashMap::new())),
            store.clone(),
            store.clone(),
            Arc::new(AppConfig::default()),
        );
        let listener = Arc::new(RecordingListener::default());
        let (scheduler, handle) = create_scheduler(
            shutdown_token,
            job_context,
            listener.clone(),
            &SchedulerSettings::default(),
        );
        Fixture {
            scheduler,
            handle,
            listener,
            store,
            _temp_dir: temp_dir,
        }
    }

    async fn set_next_fire(fixture: &Fixture, job_id: &str, next_fire: DateTime<Utc>) {
        let mut state = fixture.scheduler.shared_state.write().await;
        state.jobs.get_mut(job_id).unwrap().next_fire_at = Some(next_fire);
    }

    async fn wait_for_running_jobs(scheduler: &mut JobScheduler) {
        for (_, handle) in scheduler.running_handles.drain() {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_register_job() {
        let mut fixture = create_test_scheduler();

        fixture
            .scheduler
            .register_job(Arc::new(TestJob::new("test_job")))
            .await
            .unwrap();
        let duplicate = fixture
            .scheduler
            .register_job(Arc::new(TestJob::new("test_job")))
            .await;

        assert_eq!(duplicate, Err(JobError::AlreadyExists));
        let jobs = fixture.handle.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "test_job");
        assert_eq!(jobs[0].cron, "* * * * *");
        assert_eq!(jobs[0].state, JobState::Scheduled);
        assert!(jobs[0].next_fire_at.unwrap() > Utc::now());
        assert!(jobs[0].last_outcome.is_none());
    }

    #[tokio::test]
    async fn test_due_job_runs_and_returns_to_scheduled() {
        let mut fixture = create_test_scheduler();
        let job = TestJob::new("test_job");
        let count = job.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();
        let t0 = at("2024-08-30T12:00:00Z");
        set_next_fire(&fixture, "test_job", t0).await;

        fixture.scheduler.run_due_jobs(t0).await;
        wait_for_running_jobs(&mut fixture.scheduler).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let info = fixture.handle.get_job("test_job").await.unwrap();
        assert_eq!(info.state, JobState::Scheduled);
        assert_eq!(info.last_outcome, Some(JobState::Succeeded));
        assert_eq!(info.next_fire_at, Some(at("2024-08-30T12:01:00Z")));
        assert!(matches!(
            fixture.listener.events().as_slice(),
            [JobEvent::Executed {
                outcome: JobOutcome::Succeeded,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_fire_while_running_is_skipped() {
        let mut fixture = create_test_scheduler();
        let gate = Arc::new(Semaphore::new(0));
        let mut job = TestJob::new("test_job");
        job.gate = Some(gate.clone());
        let count = job.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();
        let t0 = at("2024-08-30T12:00:00Z");
        set_next_fire(&fixture, "test_job", t0).await;

        fixture.scheduler.run_due_jobs(t0).await;
        assert!(fixture.handle.is_job_running("test_job").await);

        // The next tick arrives while the first run is blocked.
        fixture
            .scheduler
            .run_due_jobs(at("2024-08-30T12:01:00Z"))
            .await;
        assert_eq!(fixture.scheduler.running_handles.len(), 1);

        gate.add_permits(1);
        wait_for_running_jobs(&mut fixture.scheduler).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.store.recent_job_logs("test_job", 10).unwrap().len(), 1);
        let events = fixture.listener.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            JobEvent::Skipped {
                job_id: "test_job".to_string(),
                scheduled_for: at("2024-08-30T12:01:00Z"),
            }
        );
        assert!(matches!(events[1], JobEvent::Executed { .. }));
    }

    #[tokio::test]
    async fn test_missed_fires_are_coalesced() {
        let mut fixture = create_test_scheduler();
        let job = TestJob::new("test_job");
        let count = job.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();
        set_next_fire(&fixture, "test_job", at("2024-08-30T12:00:00Z")).await;

        // Four fire times (12:00..12:03) have passed; the latest is 10s late.
        fixture
            .scheduler
            .run_due_jobs(at("2024-08-30T12:03:10Z"))
            .await;
        wait_for_running_jobs(&mut fixture.scheduler).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let info = fixture.handle.get_job("test_job").await.unwrap();
        assert_eq!(info.next_fire_at, Some(at("2024-08-30T12:04:00Z")));
    }

    #[tokio::test]
    async fn test_fire_beyond_misfire_grace_is_dropped() {
        let mut fixture = create_test_scheduler();
        let mut job = TestJob::new("daily_job");
        job.schedule = CronSchedule::parse("0 0 * * *").unwrap();
        let count = job.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();
        set_next_fire(&fixture, "daily_job", at("2024-08-30T00:00:00Z")).await;

        fixture
            .scheduler
            .run_due_jobs(at("2024-08-30T00:05:01Z"))
            .await;

        assert!(fixture.scheduler.running_handles.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(
            fixture.listener.events(),
            vec![JobEvent::Missed {
                job_id: "daily_job".to_string(),
                scheduled_for: at("2024-08-30T00:00:00Z"),
                lateness: Duration::from_secs(301),
            }]
        );
        let info = fixture.handle.get_job("daily_job").await.unwrap();
        assert_eq!(info.next_fire_at, Some(at("2024-08-31T00:00:00Z")));
    }

    #[tokio::test]
    async fn test_fire_within_misfire_grace_runs() {
        let mut fixture = create_test_scheduler();
        let mut job = TestJob::new("daily_job");
        job.schedule = CronSchedule::parse("0 0 * * *").unwrap();
        let count = job.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();
        set_next_fire(&fixture, "daily_job", at("2024-08-30T00:00:00Z")).await;

        fixture
            .scheduler
            .run_due_jobs(at("2024-08-30T00:04:59Z"))
            .await;
        wait_for_running_jobs(&mut fixture.scheduler).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paused_job_does_not_fire() {
        let mut fixture = create_test_scheduler();
        let job = TestJob::new("test_job");
        let count = job.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();
        let t0 = at("2024-08-30T12:00:00Z");
        set_next_fire(&fixture, "test_job", t0).await;

        fixture.scheduler.pause_job("test_job").await.unwrap();
        fixture.scheduler.run_due_jobs(t0).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        let info = fixture.handle.get_job("test_job").await.unwrap();
        assert!(info.paused);
        assert_eq!(info.state, JobState::Paused);
        assert_eq!(
            fixture.scheduler.trigger_job("test_job").await,
            Err(JobError::Paused)
        );

        fixture.scheduler.resume_job("test_job").await.unwrap();
        let info = fixture.handle.get_job("test_job").await.unwrap();
        assert_eq!(info.state, JobState::Scheduled);
        assert!(info.next_fire_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_pause_while_running_applies_after_run() {
        let mut fixture = create_test_scheduler();
        let gate = Arc::new(Semaphore::new(0));
        let mut job = TestJob::new("test_job");
        job.gate = Some(gate.clone());
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();

        fixture.scheduler.trigger_job("test_job").await.unwrap();
        fixture.scheduler.pause_job("test_job").await.unwrap();
        let info = fixture.handle.get_job("test_job").await.unwrap();
        assert!(info.is_running);
        assert!(info.paused);

        gate.add_permits(1);
        wait_for_running_jobs(&mut fixture.scheduler).await;

        let info = fixture.handle.get_job("test_job").await.unwrap();
        assert_eq!(info.state, JobState::Paused);
        assert_eq!(info.last_outcome, Some(JobState::Succeeded));
    }

    #[tokio::test]
    async fn test_manual_trigger_respects_single_flight() {
        let mut fixture = create_test_scheduler();
        let gate = Arc::new(Semaphore::new(0));
        let mut job = TestJob::new("test_job");
        job.gate = Some(gate.clone());
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();

        fixture.scheduler.trigger_job("test_job").await.unwrap();
        assert_eq!(
            fixture.scheduler.trigger_job("test_job").await,
            Err(JobError::AlreadyRunning)
        );
        assert_eq!(
            fixture.scheduler.trigger_job("missing").await,
            Err(JobError::NotFound)
        );

        gate.add_permits(1);
        wait_for_running_jobs(&mut fixture.scheduler).await;
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_jobs() {
        let mut fixture = create_test_scheduler();
        let mut failing = TestJob::new("failing_job");
        failing.outcome = Err(JobError::ExecutionFailed("boom".to_string()));
        let healthy = TestJob::new("healthy_job");
        let healthy_count = healthy.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(failing)).await.unwrap();
        fixture.scheduler.register_job(Arc::new(healthy)).await.unwrap();
        fixture
            .scheduler
            .register_job(Arc::new(PanickingJob(CronSchedule::parse("* * * * *").unwrap())))
            .await
            .unwrap();
        let t0 = at("2024-08-30T12:00:00Z");
        for job_id in ["failing_job", "healthy_job", "panicking_job"] {
            set_next_fire(&fixture, job_id, t0).await;
        }

        fixture.scheduler.run_due_jobs(t0).await;
        wait_for_running_jobs(&mut fixture.scheduler).await;

        assert_eq!(healthy_count.load(Ordering::SeqCst), 1);
        let panicked = fixture.handle.get_job("panicking_job").await.unwrap();
        assert_eq!(panicked.state, JobState::Scheduled);
        assert_eq!(panicked.last_outcome, Some(JobState::Failed));
        let failed = fixture.handle.get_job("failing_job").await.unwrap();
        assert_eq!(failed.last_outcome, Some(JobState::Failed));

        let events = fixture.listener.events();
        let failures: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, JobEvent::Failed { .. }))
            .map(JobEvent::job_id)
            .collect();
        assert_eq!(failures.len(), 2);
        assert!(failures.contains(&"panicking_job"));
    }

    #[tokio::test]
    async fn test_remove_job() {
        let mut fixture = create_test_scheduler();
        fixture
            .scheduler
            .register_job(Arc::new(TestJob::new("test_job")))
            .await
            .unwrap();

        fixture.scheduler.remove_job("test_job").await.unwrap();

        assert!(!fixture.handle.job_exists("test_job").await);
        assert_eq!(
            fixture.scheduler.remove_job("test_job").await,
            Err(JobError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_time_until_next_fire() {
        let mut fixture = create_test_scheduler();
        let now = at("2024-08-30T12:00:30Z");
        assert_eq!(fixture.scheduler.time_until_next_fire(now).await, MAX_SLEEP);

        fixture
            .scheduler
            .register_job(Arc::new(TestJob::new("test_job")))
            .await
            .unwrap();
        set_next_fire(&fixture, "test_job", at("2024-08-30T12:01:00Z")).await;
        assert_eq!(
            fixture.scheduler.time_until_next_fire(now).await,
            Duration::from_secs(30)
        );

        set_next_fire(&fixture, "test_job", at("2024-08-30T12:00:00Z")).await;
        assert_eq!(
            fixture.scheduler.time_until_next_fire(now).await,
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_handle_commands_and_shutdown_wait() {
        let fixture = create_test_scheduler();
        let Fixture {
            mut scheduler,
            handle,
            store,
            _temp_dir,
            ..
        } = fixture;
        let gate = Arc::new(Semaphore::new(0));
        let mut job = TestJob::new("test_job");
        job.gate = Some(gate.clone());
        // Only fires when triggered.
        job.schedule = CronSchedule::parse("0 0 1 1 *").unwrap();
        let count = job.execution_count.clone();

        let loop_task = tokio::spawn(async move { scheduler.run().await });

        handle.add_job(Arc::new(job)).await.unwrap();
        assert_eq!(
            handle.add_job(Arc::new(TestJob::new("test_job"))).await,
            Err(JobError::AlreadyExists)
        );
        handle.trigger_job("test_job").await.unwrap();
        assert!(handle.is_job_running("test_job").await);

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.add_permits(1);
        });
        // Returns only once the in-flight run has persisted its log.
        handle.shutdown(true).await.unwrap();
        releaser.await.unwrap();
        loop_task.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.recent_job_logs("test_job", 10).unwrap().len(), 1);
        let history = handle.job_history("test_job", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            handle.trigger_job("test_job").await,
            Err(JobError::SchedulerUnavailable)
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_waits_for_running_jobs() {
        let fixture = create_test_scheduler();
        let Fixture {
            mut scheduler,
            handle,
            store,
            _temp_dir,
            ..
        } = fixture;
        let shutdown_token = scheduler.shutdown_token.clone();
        let gate = Arc::new(Semaphore::new(0));
        let mut job = TestJob::new("test_job");
        job.gate = Some(gate.clone());
        job.schedule = CronSchedule::parse("0 0 1 1 *").unwrap();
        let count = job.execution_count.clone();
        let saw_cancel = job.saw_cancel.clone();
        scheduler.register_job(Arc::new(job)).await.unwrap();

        let loop_task = tokio::spawn(async move { scheduler.run().await });
        handle.trigger_job("test_job").await.unwrap();

        // Default settings wait for running jobs on the shutdown signal.
        shutdown_token.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!loop_task.is_finished());
        gate.add_permits(1);
        loop_task.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!saw_cancel.load(Ordering::SeqCst));
        assert_eq!(store.recent_job_logs("test_job", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_removed_job_cannot_overlap_its_last_run() {
        let mut fixture = create_test_scheduler();
        let gate = Arc::new(Semaphore::new(0));
        let mut job = TestJob::new("test_job");
        job.gate = Some(gate.clone());
        let count = job.execution_count.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();

        fixture.scheduler.trigger_job("test_job").await.unwrap();
        fixture.scheduler.remove_job("test_job").await.unwrap();

        let mut replacement = TestJob::new("test_job");
        replacement.gate = Some(gate.clone());
        let replacement = Arc::new(replacement);
        assert_eq!(
            fixture.scheduler.register_job(replacement.clone()).await,
            Err(JobError::AlreadyRunning)
        );
        assert_eq!(
            fixture.scheduler.trigger_job("test_job").await,
            Err(JobError::NotFound)
        );
        assert_eq!(fixture.scheduler.running_handles.len(), 1);

        // Waits for the first run even though its job entry is gone.
        gate.add_permits(1);
        fixture.scheduler.shutdown(true).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.store.recent_job_logs("test_job", 10).unwrap().len(), 1);

        // Once the old run is over the id can be registered again.
        fixture.scheduler.register_job(replacement).await.unwrap();
        assert!(fixture.handle.job_exists("test_job").await);
    }

    #[tokio::test]
    async fn test_shutdown_without_wait_cancels_jobs() {
        let mut fixture = create_test_scheduler();
        let gate = Arc::new(Semaphore::new(0));
        let mut job = TestJob::new("test_job");
        job.gate = Some(gate.clone());
        let count = job.execution_count.clone();
        let saw_cancel = job.saw_cancel.clone();
        fixture.scheduler.register_job(Arc::new(job)).await.unwrap();
        fixture.scheduler.trigger_job("test_job").await.unwrap();

        fixture.scheduler.shutdown(false).await;
        assert!(fixture.scheduler.running_handles.is_empty());

        gate.add_permits(1);
        for _ in 0..100 {
            if count.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(saw_cancel.load(Ordering::SeqCst));
    }
}
