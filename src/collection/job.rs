//! One collection run: authenticate, then fetch, normalize and store every VIN
//! in bounded-concurrency batches and summarize the outcome in an execution log.

use super::inspector::RecordInspector;
use crate::config::AppConfig;
use crate::error::{TelemetryError, TelemetryResult};
use crate::normalization::Normalizer;
use crate::provider::GpsProvider;
use crate::telemetry::{JobExecutionLog, ReportType, VehicleError, MAX_RECORDED_ERRORS};
use crate::telemetry_store::TelemetryStore;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tuning knobs for a collection run.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub inspector: RecordInspector,
    pub speed_threshold_kmh: Decimal,
    pub max_job_duration_secs: u64,
    pub max_failure_rate: f64,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrency: 10,
            inspector: RecordInspector::None,
            speed_threshold_kmh: Decimal::from(80),
            max_job_duration_secs: 600,
            max_failure_rate: 0.1,
        }
    }
}

impl CollectionOptions {
    pub fn from_config(config: &AppConfig, inspector: RecordInspector) -> Self {
        Self {
            batch_size: config.collection.batch_size,
            max_concurrency: config.collection.max_concurrent_requests,
            inspector,
            speed_threshold_kmh: Decimal::from(config.collection.speed_violation_threshold_kmh),
            max_job_duration_secs: config.alerts.max_job_duration_secs,
            max_failure_rate: config.alerts.max_failure_rate,
        }
    }
}

/// Fetch, normalize and store a single VIN.
struct VehicleProcessor {
    report_type: ReportType,
    provider: Arc<dyn GpsProvider>,
    normalizer: Normalizer,
    store: Arc<dyn TelemetryStore>,
    inspector: RecordInspector,
    speed_threshold_kmh: Decimal,
}

impl VehicleProcessor {
    /// Returns the inspector count for the stored records.
    async fn process(&self, vin: &str) -> TelemetryResult<u64> {
        let payload = self
            .provider
            .get_vehicle_data_by_vin(vin, self.report_type)
            .await?;
        if payload.is_empty() {
            return Err(TelemetryError::provider(format!(
                "No {} data returned for VIN {}",
                self.report_type, vin
            )));
        }

        let now = Utc::now();
        let mut records = Vec::with_capacity(payload.len());
        let mut first_error = None;
        for (vehicle_key, fields) in &payload.parsed_data {
            match self
                .normalizer
                .normalize_vehicle(self.report_type, vehicle_key, fields, now)
            {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(
                    "Dropped {} entry {} for VIN {}",
                    self.report_type, vehicle_key, vin
                ),
                Err(e) => {
                    warn!(
                        "Failed to normalize vehicle {} for VIN {}: {}",
                        vehicle_key, vin, e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if records.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                TelemetryError::Normalization(format!(
                    "No valid {} telemetry for VIN {}",
                    self.report_type, vin
                ))
            }));
        }

        self.store.insert_many(&records)?;
        Ok(self.inspector.count(&records, self.speed_threshold_kmh))
    }
}

/// Running totals for one run.
#[derive(Default)]
struct RunTally {
    succeeded: u64,
    failed: u64,
    inspected: u64,
    total_errors: usize,
    errors: Vec<VehicleError>,
    critical: Option<String>,
}

impl RunTally {
    fn record(&mut self, vin: String, result: TelemetryResult<u64>) {
        match result {
            Ok(count) => {
                self.succeeded += 1;
                self.inspected += count;
            }
            Err(e) => {
                error!("Failed to collect data for VIN {}: {}", vin, e);
                self.failed += 1;
                self.total_errors += 1;
                if self.errors.len() < MAX_RECORDED_ERRORS {
                    self.errors.push(VehicleError {
                        vin,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

/// A collection run for one report type.
pub struct CollectionJob {
    job_name: String,
    processor: Arc<VehicleProcessor>,
    store: Arc<dyn TelemetryStore>,
    options: CollectionOptions,
}

impl CollectionJob {
    pub fn new(
        job_name: impl Into<String>,
        report_type: ReportType,
        provider: Arc<dyn GpsProvider>,
        store: Arc<dyn TelemetryStore>,
        options: CollectionOptions,
    ) -> Self {
        let normalizer = Normalizer::new(provider.provider_name());
        Self {
            job_name: job_name.into(),
            processor: Arc::new(VehicleProcessor {
                report_type,
                provider,
                normalizer,
                store: Arc::clone(&store),
                inspector: options.inspector,
                speed_threshold_kmh: options.speed_threshold_kmh,
            }),
            store,
            options,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn report_type(&self) -> ReportType {
        self.processor.report_type
    }

    /// Run over `vins` and persist the execution log.
    ///
    /// Never fails: every outcome, including a critical failure, is reported in
    /// the returned log.
    pub async fn run(&self, vins: &[String], cancel: CancellationToken) -> JobExecutionLog {
        let report_type = self.processor.report_type;
        let mut log = JobExecutionLog::new(&self.job_name, report_type.as_str());
        log.mark_running();
        info!(
            "Starting {} collection for {} vehicles",
            report_type,
            vins.len()
        );

        if let Err(message) = self.authenticate().await {
            error!("{}: {}", self.job_name, message);
            log.fail_critically(message);
            self.persist(&log);
            return log;
        }

        if vins.is_empty() {
            warn!("{}: no active vehicles to collect", self.job_name);
        }

        let tally = self.collect(vins, &cancel).await;
        let cancelled = cancel.is_cancelled();

        log.vehicles_succeeded = tally.succeeded;
        log.vehicles_failed = tally.failed;
        match &tally.critical {
            Some(message) => log.fail_critically(message.clone()),
            None => log.complete(tally.succeeded, tally.failed, tally.total_errors, &tally.errors),
        }

        self.fill_metadata(&mut log, vins.len(), &tally, cancelled);
        info!(
            "{} finished with status {} ({}/{} succeeded, {:.1}%) in {:.2}s",
            self.job_name,
            log.status.as_str(),
            log.vehicles_succeeded,
            log.vehicles_processed,
            log.success_rate(),
            log.duration_seconds().unwrap_or_default()
        );

        self.persist(&log);
        log
    }

    async fn authenticate(&self) -> Result<(), String> {
        match self.processor.provider.authenticate().await {
            Ok(true) => Ok(()),
            Ok(false) => Err("Failed to authenticate with GPS provider".to_string()),
            Err(e) => Err(format!("GPS provider authentication error: {}", e)),
        }
    }

    async fn collect(&self, vins: &[String], cancel: &CancellationToken) -> RunTally {
        let mut tally = RunTally::default();
        let batch_size = self.options.batch_size.max(1);
        let batch_count = vins.len().div_ceil(batch_size);

        for (index, batch) in vins.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!("{} cancelled before batch {}", self.job_name, index + 1);
                break;
            }
            debug!(
                "{}: processing batch {}/{} ({} vehicles)",
                self.job_name,
                index + 1,
                batch_count,
                batch.len()
            );
            self.run_batch(batch, cancel, &mut tally).await;
            if tally.critical.is_some() {
                break;
            }
        }

        tally
    }

    /// Fixed pool of workers pulling VINs from a shared queue.
    async fn run_batch(&self, batch: &[String], cancel: &CancellationToken, tally: &mut RunTally) {
        let (vin_tx, vin_rx) = mpsc::channel(batch.len());
        for vin in batch {
            // Capacity matches the batch, so this never waits.
            if vin_tx.send(vin.clone()).await.is_err() {
                break;
            }
        }
        drop(vin_tx);

        let queue = Arc::new(Mutex::new(vin_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let worker_count = self.options.max_concurrency.max(1).min(batch.len());

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let processor = Arc::clone(&self.processor);
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().await.recv().await;
                    let Some(vin) = next else {
                        break;
                    };
                    let result = processor.process(&vin).await;
                    if result_tx.send((vin, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("{}: collection worker crashed: {}", self.job_name, e);
                tally
                    .critical
                    .get_or_insert_with(|| format!("Collection worker crashed: {}", e));
            }
        }

        while let Ok((vin, result)) = result_rx.try_recv() {
            tally.record(vin, result);
        }
    }

    fn fill_metadata(
        &self,
        log: &mut JobExecutionLog,
        total_vins: usize,
        tally: &RunTally,
        cancelled: bool,
    ) {
        let metadata = &mut log.execution_metadata;
        metadata.insert("report_type".into(), json!(self.processor.report_type.as_str()));
        metadata.insert(
            "provider".into(),
            json!(self.processor.normalizer.provider_name()),
        );
        metadata.insert("total_vins".into(), json!(total_vins));
        metadata.insert("batch_size".into(), json!(self.options.batch_size));
        metadata.insert("max_concurrency".into(), json!(self.options.max_concurrency));
        if let Some(key) = self.options.inspector.metadata_key() {
            metadata.insert(key.into(), json!(tally.inspected));
        }
        if cancelled {
            metadata.insert("cancelled".into(), Value::Bool(true));
        }

        let mut alerts = Vec::new();
        let duration = log.duration_seconds().unwrap_or_default();
        if duration > self.options.max_job_duration_secs as f64 {
            warn!(
                "{} took {:.1}s, above the {}s threshold",
                self.job_name, duration, self.options.max_job_duration_secs
            );
            alerts.push(json!({"type": "long_duration", "duration_seconds": duration}));
        }
        let failure_rate = log.failure_rate();
        if failure_rate > self.options.max_failure_rate {
            warn!(
                "{} failure rate {:.1}% above the {:.1}% threshold",
                self.job_name,
                failure_rate * 100.0,
                self.options.max_failure_rate * 100.0
            );
            alerts.push(json!({"type": "high_failure_rate", "failure_rate": failure_rate}));
        }
        if !alerts.is_empty() {
            log.execution_metadata.insert("alerts".into(), Value::Array(alerts));
        }
    }

    fn persist(&self, log: &JobExecutionLog) {
        if let Err(e) = self.store.insert_job_log(log) {
            error!("Failed to save execution log for {}: {}", self.job_name, e);
        }
    }
}
