mod file_config;

pub use file_config::{
    AlertsConfig, CollectionConfig, FileConfig, JobConfig, ProviderConfig, RetentionConfig,
    SchedulerConfig,
};

use crate::background_jobs::{CronSchedule, RETENTION_CLEANUP_JOB_ID};
use crate::collection::find_collection_job;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

const DEFAULT_DB_PATH: &str = "telemetry.db";

/// Which GPS provider implementation to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    #[default]
    Mock,
    Real,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub provider: Option<ProviderKind>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub log_level: Option<String>,

    // Feature configs (with defaults)
    pub provider: ProviderSettings,
    pub collection: CollectionSettings,
    pub scheduler: SchedulerSettings,
    pub retention: RetentionSettings,
    pub alerts: AlertSettings,
    pub jobs: HashMap<String, JobConfig>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let log_level = file.log_level.or_else(|| cli.log_level.clone());

        let provider_file = file.provider.unwrap_or_default();
        let kind = match provider_file.kind {
            Some(kind) => match ProviderKind::from_str(&kind, true) {
                Ok(kind) => kind,
                Err(_) => bail!("Unknown provider type: {}", kind),
            },
            None => cli.provider.unwrap_or_default(),
        };
        let defaults = ProviderSettings::default();
        let provider = ProviderSettings {
            kind,
            base_url: provider_file.base_url.or_else(|| cli.base_url.clone()),
            endpoint: provider_file.endpoint.unwrap_or(defaults.endpoint),
            username: provider_file.username.unwrap_or_default(),
            password: provider_file.password.unwrap_or_default(),
            timeout_secs: provider_file.timeout_secs.unwrap_or(defaults.timeout_secs),
            max_retries: provider_file.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff: provider_file.retry_backoff.unwrap_or(defaults.retry_backoff),
            min_backoff_secs: provider_file
                .min_backoff_secs
                .unwrap_or(defaults.min_backoff_secs),
            max_backoff_secs: provider_file
                .max_backoff_secs
                .unwrap_or(defaults.max_backoff_secs),
            simulate_latency: provider_file
                .simulate_latency
                .unwrap_or(defaults.simulate_latency),
        };

        let collection_file = file.collection.unwrap_or_default();
        let defaults = CollectionSettings::default();
        let collection = CollectionSettings {
            max_concurrent_requests: collection_file
                .max_concurrent_requests
                .unwrap_or(defaults.max_concurrent_requests),
            batch_size: collection_file.batch_size.unwrap_or(defaults.batch_size),
            rate_limit_per_second: collection_file
                .rate_limit_per_second
                .unwrap_or(defaults.rate_limit_per_second),
            speed_violation_threshold_kmh: collection_file
                .speed_violation_threshold_kmh
                .unwrap_or(defaults.speed_violation_threshold_kmh),
        };

        let scheduler_file = file.scheduler.unwrap_or_default();
        let defaults = SchedulerSettings::default();
        let scheduler = SchedulerSettings {
            misfire_grace_secs: scheduler_file
                .misfire_grace_secs
                .unwrap_or(defaults.misfire_grace_secs),
            shutdown_wait: scheduler_file.shutdown_wait.unwrap_or(defaults.shutdown_wait),
        };

        let retention_file = file.retention.unwrap_or_default();
        let defaults = RetentionSettings::default();
        let retention = RetentionSettings {
            telemetry_retention_days: retention_file
                .telemetry_retention_days
                .unwrap_or(defaults.telemetry_retention_days),
            job_log_retention_days: retention_file
                .job_log_retention_days
                .unwrap_or(defaults.job_log_retention_days),
            cleanup_cron: retention_file.cleanup_cron.unwrap_or(defaults.cleanup_cron),
        };

        let alerts_file = file.alerts.unwrap_or_default();
        let defaults = AlertSettings::default();
        let alerts = AlertSettings {
            max_job_duration_secs: alerts_file
                .max_job_duration_secs
                .unwrap_or(defaults.max_job_duration_secs),
            max_failure_rate: alerts_file
                .max_failure_rate
                .unwrap_or(defaults.max_failure_rate),
        };

        let config = Self {
            db_path,
            log_level,
            provider,
            collection,
            scheduler,
            retention,
            alerts,
            jobs: file.jobs,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(level) = &self.log_level {
            if level.parse::<LevelFilter>().is_err() {
                bail!("Invalid log_level: {}", level);
            }
        }
        if self.provider.kind == ProviderKind::Real && self.provider.base_url.is_none() {
            bail!("provider.base_url must be set when using the real provider");
        }
        if self.provider.max_retries < 1 {
            bail!("provider.max_retries must be at least 1");
        }
        if self.provider.min_backoff_secs > self.provider.max_backoff_secs {
            bail!(
                "provider.min_backoff_secs ({}) exceeds provider.max_backoff_secs ({})",
                self.provider.min_backoff_secs,
                self.provider.max_backoff_secs
            );
        }
        if self.collection.rate_limit_per_second <= 0.0 {
            bail!("collection.rate_limit_per_second must be positive");
        }
        if self.collection.batch_size == 0 {
            bail!("collection.batch_size must be positive");
        }
        if self.collection.max_concurrent_requests == 0 {
            bail!("collection.max_concurrent_requests must be positive");
        }
        if !(0.0..=1.0).contains(&self.alerts.max_failure_rate) {
            bail!("alerts.max_failure_rate must be between 0 and 1");
        }
        if let Err(e) = CronSchedule::parse(&self.retention.cleanup_cron) {
            bail!("retention.cleanup_cron: {}", e);
        }
        for (job_id, job) in &self.jobs {
            if job_id != RETENTION_CLEANUP_JOB_ID && find_collection_job(job_id).is_none() {
                bail!("Unknown job in [jobs] section: {}", job_id);
            }
            if let Some(cron) = &job.cron {
                if let Err(e) = CronSchedule::parse(cron) {
                    bail!("jobs.{}.cron: {}", job_id, e);
                }
            }
        }
        Ok(())
    }

    /// Whether a job is enabled, given its built-in default.
    pub fn job_enabled(&self, job_id: &str, default: bool) -> bool {
        self.jobs
            .get(job_id)
            .and_then(|job| job.enabled)
            .unwrap_or(default)
    }

    /// The job's cron expression, given its built-in default.
    pub fn job_cron<'a>(&'a self, job_id: &str, default: &'a str) -> &'a str {
        self.jobs
            .get(job_id)
            .and_then(|job| job.cron.as_deref())
            .unwrap_or(default)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff: f64,
    pub min_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub simulate_latency: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Mock,
            base_url: None,
            endpoint: "/prod/prod".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff: 2.0,
            min_backoff_secs: 1,
            max_backoff_secs: 30,
            simulate_latency: true,
        }
    }
}

impl ProviderSettings {
    /// Full URL the real provider posts to.
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.as_deref().unwrap_or_default();
        format!("{}{}", base.trim_end_matches('/'), self.endpoint)
    }
}

#[derive(Debug, Clone)]
pub struct CollectionSettings {
    pub max_concurrent_requests: usize,
    pub batch_size: usize,
    pub rate_limit_per_second: f64,
    pub speed_violation_threshold_kmh: u32,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            batch_size: 50,
            rate_limit_per_second: 5.0,
            speed_violation_threshold_kmh: 80,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub misfire_grace_secs: u64,
    /// Let running jobs finish on shutdown instead of cancelling them.
    pub shutdown_wait: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            misfire_grace_secs: 300,
            shutdown_wait: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub telemetry_retention_days: u64,
    pub job_log_retention_days: u64,
    pub cleanup_cron: String,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            telemetry_retention_days: 90,
            job_log_retention_days: 30,
            cleanup_cron: "30 3 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub max_job_duration_secs: u64,
    /// Fraction of failed vehicles, 0..=1.
    pub max_failure_rate: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            max_job_duration_secs: 600,
            max_failure_rate: 0.1,
        }
    }
}
