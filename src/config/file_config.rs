use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub log_level: Option<String>,

    // Feature configs
    pub provider: Option<ProviderConfig>,
    pub collection: Option<CollectionConfig>,
    pub scheduler: Option<SchedulerConfig>,
    pub retention: Option<RetentionConfig>,
    pub alerts: Option<AlertsConfig>,
    /// Per-job overrides keyed by job id.
    pub jobs: HashMap<String, JobConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    /// "mock" or "real"
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub base_url: Option<String>,
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff: Option<f64>,
    pub min_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub simulate_latency: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CollectionConfig {
    pub max_concurrent_requests: Option<usize>,
    pub batch_size: Option<usize>,
    pub rate_limit_per_second: Option<f64>,
    pub speed_violation_threshold_kmh: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub misfire_grace_secs: Option<u64>,
    pub shutdown_wait: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub telemetry_retention_days: Option<u64>,
    pub job_log_retention_days: Option<u64>,
    pub cleanup_cron: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub max_job_duration_secs: Option<u64>,
    pub max_failure_rate: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct JobConfig {
    pub enabled: Option<bool>,
    pub cron: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
