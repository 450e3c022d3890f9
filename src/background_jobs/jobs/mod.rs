//! Specific scheduled job implementations.

pub mod collection;
pub mod retention_cleanup;

pub use collection::CollectionTask;
pub use retention_cleanup::{RetentionCleanupJob, RETENTION_CLEANUP_JOB_ID};

use super::job::{JobError, ScheduledJob};
use crate::collection::BUILTIN_COLLECTION_JOBS;
use crate::config::AppConfig;
use std::sync::Arc;
use tracing::info;

/// Build every enabled job, applying per-job overrides from the config.
pub fn build_jobs(config: &AppConfig) -> Result<Vec<Arc<dyn ScheduledJob>>, JobError> {
    let mut jobs: Vec<Arc<dyn ScheduledJob>> = Vec::new();

    for spec in BUILTIN_COLLECTION_JOBS {
        if !config.job_enabled(spec.id, spec.enabled_by_default) {
            info!("Job {} is disabled", spec.id);
            continue;
        }
        let cron = config.job_cron(spec.id, spec.default_cron);
        jobs.push(Arc::new(CollectionTask::new(spec, cron)?));
    }

    if config.job_enabled(RETENTION_CLEANUP_JOB_ID, true) {
        let retention = &config.retention;
        let cron = config.job_cron(RETENTION_CLEANUP_JOB_ID, &retention.cleanup_cron);
        jobs.push(Arc::new(RetentionCleanupJob::new(
            cron,
            retention.telemetry_retention_days,
            retention.job_log_retention_days,
        )?));
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;

    fn job_ids(jobs: &[Arc<dyn ScheduledJob>]) -> Vec<&'static str> {
        jobs.iter().map(|job| job.id()).collect()
    }

    #[test]
    fn test_default_jobs() {
        let jobs = build_jobs(&AppConfig::default()).unwrap();
        let ids = job_ids(&jobs);

        assert_eq!(ids.len(), 7);
        assert!(ids.contains(&"vehicle_position_collection"));
        assert!(ids.contains(&"voltage_health_check"));
        assert!(ids.contains(&RETENTION_CLEANUP_JOB_ID));
        assert!(!ids.contains(&"trip_summary_collection"));
    }

    #[test]
    fn test_job_overrides() {
        let mut config = AppConfig::default();
        config.jobs.insert(
            "trip_summary_collection".to_string(),
            JobConfig {
                enabled: Some(true),
                cron: Some("15 4 * * *".to_string()),
            },
        );
        config.jobs.insert(
            "speed_monitoring".to_string(),
            JobConfig {
                enabled: Some(false),
                cron: None,
            },
        );

        let jobs = build_jobs(&config).unwrap();

        let trips = jobs
            .iter()
            .find(|job| job.id() == "trip_summary_collection")
            .unwrap();
        assert_eq!(trips.schedule().expression(), "15 4 * * *");
        assert!(!job_ids(&jobs).contains(&"speed_monitoring"));
    }
}
