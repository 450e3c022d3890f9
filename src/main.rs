use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gps_telemetry_collector::background_jobs::{
    build_jobs, create_scheduler, CollectionTask, JobContext, LoggingListener, RetentionCleanupJob,
    ScheduledJob, RETENTION_CLEANUP_JOB_ID,
};
use gps_telemetry_collector::collection::find_collection_job;
use gps_telemetry_collector::config::{self, AppConfig, ProviderKind};
use gps_telemetry_collector::create_provider;
use gps_telemetry_collector::telemetry::JobExecutionSummary;
use gps_telemetry_collector::telemetry_store::{
    seed_mock_fleet, SqliteTelemetryStore, TelemetryStore, VehicleDirectory,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite telemetry database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Default log level (trace, debug, info, warn, error). LOG_LEVEL takes precedence.
    #[clap(long)]
    pub log_level: Option<String>,

    /// GPS provider implementation to use.
    #[clap(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Base URL of the GPS provider API. Required with `--provider real`.
    #[clap(long)]
    pub base_url: Option<String>,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until Ctrl+C (default).
    Run,
    /// Execute a single job immediately and print its latest execution log.
    RunOnce {
        /// Job id, e.g. vehicle_position_collection.
        job_id: String,
    },
    /// Register the mock provider's demo fleet in the vehicle directory.
    SeedMockVehicles,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db_path.clone(),
            log_level: args.log_level.clone(),
            provider: args.provider,
            base_url: args.base_url.clone(),
        }
    }
}

fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let default_level = match log_level {
        Some(level) => level
            .parse::<LevelFilter>()
            .with_context(|| format!("Invalid log level: {}", level))?,
        None => LevelFilter::INFO,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;
    Ok(())
}

/// Build a single job by id, even when it is disabled in the config.
fn find_job(app_config: &AppConfig, job_id: &str) -> Result<Arc<dyn ScheduledJob>> {
    if job_id == RETENTION_CLEANUP_JOB_ID {
        let retention = &app_config.retention;
        let cron = app_config.job_cron(job_id, &retention.cleanup_cron);
        let job = RetentionCleanupJob::new(
            cron,
            retention.telemetry_retention_days,
            retention.job_log_retention_days,
        )?;
        return Ok(Arc::new(job));
    }
    match find_collection_job(job_id) {
        Some(spec) => {
            let cron = app_config.job_cron(spec.id, spec.default_cron);
            Ok(Arc::new(CollectionTask::new(spec, cron)?))
        }
        None => bail!("Unknown job: {}", job_id),
    }
}

fn print_summary(job_id: &str, summary: &JobExecutionSummary) {
    println!("Job:       {}", job_id);
    println!("Status:    {}", summary.status.as_str());
    println!(
        "Vehicles:  {} processed, {} succeeded, {} failed",
        summary.vehicles_processed, summary.vehicles_succeeded, summary.vehicles_failed
    );
    println!("Success:   {:.2}%", summary.success_rate);
    if let Some(duration) = summary.duration_seconds {
        println!("Duration:  {:.2}s", duration);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => Some(config::FileConfig::load(path)?),
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = Arc::new(AppConfig::resolve(&cli_config, file_config)?);

    init_tracing(app_config.log_level.as_deref())?;

    if let Some(path) = &cli_args.config {
        info!("Loaded configuration from {:?}", path);
    }
    info!("Configuration loaded:");
    info!("  db_path: {:?}", app_config.db_path);
    info!("  provider: {:?}", app_config.provider.kind);

    info!("Opening SQLite telemetry database at {:?}...", app_config.db_path);
    let store = Arc::new(SqliteTelemetryStore::new(&app_config.db_path)?);

    if let Some(Command::SeedMockVehicles) = cli_args.command {
        let added = seed_mock_fleet(store.as_ref())?;
        println!(
            "Added {} mock vehicles ({} total)",
            added,
            store.count_vehicles(false)?
        );
        return Ok(());
    }

    let provider = create_provider(&app_config)?;

    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(
        shutdown_token.child_token(),
        provider,
        store.clone() as Arc<dyn TelemetryStore>,
        store.clone() as Arc<dyn VehicleDirectory>,
        app_config.clone(),
    );

    if let Some(Command::RunOnce { job_id }) = &cli_args.command {
        let job = find_job(&app_config, job_id)?;
        info!("Running job {} once", job_id);
        if let Err(e) = job.execute(&job_context).await {
            warn!("Job {} returned an error: {}", job_id, e);
        }
        match store.recent_job_logs(job_id, 1)?.first() {
            Some(log) => print_summary(job_id, &JobExecutionSummary::from(log)),
            None => println!("Job {} finished without an execution log", job_id),
        }
        return Ok(());
    }

    let (mut scheduler, scheduler_handle) = create_scheduler(
        shutdown_token.clone(),
        job_context,
        Arc::new(LoggingListener),
        &app_config.scheduler,
    );

    // Register jobs
    for job in build_jobs(&app_config)? {
        scheduler.register_job(job).await?;
    }

    for job in scheduler_handle.list_jobs().await {
        info!(
            "  {} [{}] next fire: {}",
            job.id,
            job.cron,
            job.next_fire_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );
    }

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, initiating graceful shutdown");

    if let Err(e) = scheduler_handle
        .shutdown(app_config.scheduler.shutdown_wait)
        .await
    {
        warn!("Scheduler shutdown request failed: {}", e);
        shutdown_token.cancel();
    }
    scheduler_task.await?;

    Ok(())
}
