//! GPS provider capability and its transport stack.

mod envelope;
mod http_provider;
pub mod mock_data;
mod mock_provider;
mod rate_limiter;
mod retry_policy;
mod transport;

pub use envelope::{ProviderEnvelope, ReportPayload};
pub use http_provider::{HttpGpsProvider, HTTP_PROVIDER_NAME};
pub use mock_provider::{MockGpsProvider, MOCK_PROVIDER_NAME};
pub use rate_limiter::RateLimiter;
pub use retry_policy::RetryPolicy;
pub use transport::{Connection, HttpConnection, Transport};

use crate::config::{AppConfig, ProviderKind};
use crate::error::TelemetryResult;
use crate::telemetry::ReportType;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

/// Fetches raw reports from a GPS provider.
#[async_trait]
pub trait GpsProvider: Send + Sync {
    /// Authenticate with the provider. `Ok(false)` means the credentials were rejected.
    async fn authenticate(&self) -> TelemetryResult<bool>;

    /// Data for a single vehicle.
    async fn get_vehicle_data_by_vin(
        &self,
        vin: &str,
        report_type: ReportType,
    ) -> TelemetryResult<ReportPayload>;

    /// Report for every vehicle on the account.
    async fn get_bulk_report(&self, report_type: ReportType) -> TelemetryResult<ReportPayload>;

    async fn get_report_by_date(
        &self,
        report_type: ReportType,
        date: NaiveDate,
    ) -> TelemetryResult<ReportPayload>;

    async fn get_report_by_time_range(
        &self,
        report_type: ReportType,
        vin: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TelemetryResult<ReportPayload>;

    /// Data for a vehicle addressed by the provider's own vehicle key.
    async fn get_report_by_name(
        &self,
        report_type: ReportType,
        vehicle_name: &str,
    ) -> TelemetryResult<ReportPayload>;

    async fn health_check(&self) -> bool;

    fn provider_name(&self) -> &str;
}

/// Build the provider selected in configuration.
pub fn create_provider(config: &AppConfig) -> TelemetryResult<Arc<dyn GpsProvider>> {
    let settings = &config.provider;
    match settings.kind {
        ProviderKind::Mock => {
            info!("Using mock GPS provider");
            Ok(Arc::new(MockGpsProvider::new(settings.simulate_latency)))
        }
        ProviderKind::Real => {
            let url = settings.endpoint_url();
            info!("Using GPS API at {}", url);
            let connection = HttpConnection::new(
                url,
                settings.timeout_secs,
                config.collection.max_concurrent_requests,
            )?;
            let transport = Transport::new(
                Arc::new(connection),
                Arc::new(RateLimiter::new(config.collection.rate_limit_per_second)),
                RetryPolicy::new(settings),
                config.collection.max_concurrent_requests,
            );
            Ok(Arc::new(HttpGpsProvider::new(
                transport,
                settings.username.clone(),
                settings.password.clone(),
            )))
        }
    }
}
