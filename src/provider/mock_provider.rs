//! Mock GPS provider returning canned fleet data.

use super::envelope::ReportPayload;
use super::mock_data::{canned_report, random_vehicle_fields};
use super::GpsProvider;
use crate::error::TelemetryResult;
use crate::telemetry::ReportType;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

pub const MOCK_PROVIDER_NAME: &str = "mock_gps_provider";

/// Simulated latency bounds, in milliseconds.
#[derive(Debug, Clone, Copy)]
struct Latency {
    min_ms: u64,
    max_ms: u64,
}

const DEFAULT_LATENCY: Latency = Latency { min_ms: 100, max_ms: 2000 };
const AUTH_LATENCY: Latency = Latency { min_ms: 500, max_ms: 1000 };
const BY_VIN_LATENCY: Latency = Latency { min_ms: 500, max_ms: 1500 };
const BULK_LATENCY: Latency = Latency { min_ms: 5000, max_ms: 10000 };
const RANGE_LATENCY: Latency = Latency { min_ms: 1000, max_ms: 3000 };
const HEALTH_LATENCY: Latency = Latency { min_ms: 100, max_ms: 300 };

/// Deterministic provider for development and tests.
///
/// Known VINs resolve to the canned fleet data; unknown VINs get randomized
/// but plausible fields under a synthetic `rand_NNNN` vehicle key.
pub struct MockGpsProvider {
    simulate_latency: bool,
    authenticated: AtomicBool,
}

impl MockGpsProvider {
    pub fn new(simulate_latency: bool) -> Self {
        Self {
            simulate_latency,
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn simulate_delay(&self, latency: Latency) {
        if !self.simulate_latency {
            return;
        }
        let millis = rand::rng().random_range(latency.min_ms..=latency.max_ms);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    fn lookup_by_vin(vin: &str, report_type: ReportType) -> ReportPayload {
        let report = canned_report(report_type);
        if let Some((key, fields)) = report.find_by_vin(vin) {
            return ReportPayload::single(key.clone(), fields.clone());
        }

        debug!("VIN {} not in mock data, generating random response", vin);
        match random_vehicle_fields(vin, report_type) {
            Some(fields) => {
                let key = format!("rand_{}", rand::rng().random_range(2000..=9999));
                ReportPayload::single(key, fields)
            }
            None => ReportPayload::default(),
        }
    }
}

#[async_trait]
impl GpsProvider for MockGpsProvider {
    async fn authenticate(&self) -> TelemetryResult<bool> {
        info!("Mock GPS provider: authenticating");
        self.simulate_delay(AUTH_LATENCY).await;
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn get_vehicle_data_by_vin(
        &self,
        vin: &str,
        report_type: ReportType,
    ) -> TelemetryResult<ReportPayload> {
        debug!("Mock GPS provider: fetching {} for VIN {}", report_type, vin);
        self.simulate_delay(BY_VIN_LATENCY).await;
        Ok(Self::lookup_by_vin(vin, report_type))
    }

    async fn get_bulk_report(&self, report_type: ReportType) -> TelemetryResult<ReportPayload> {
        info!("Mock GPS provider: fetching bulk {} report", report_type);
        self.simulate_delay(BULK_LATENCY).await;
        Ok(canned_report(report_type))
    }

    async fn get_report_by_date(
        &self,
        report_type: ReportType,
        date: NaiveDate,
    ) -> TelemetryResult<ReportPayload> {
        info!(
            "Mock GPS provider: fetching {} for date {}",
            report_type,
            date.format("%d-%m-%Y")
        );
        self.simulate_delay(DEFAULT_LATENCY).await;
        Ok(canned_report(report_type))
    }

    async fn get_report_by_time_range(
        &self,
        report_type: ReportType,
        vin: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TelemetryResult<ReportPayload> {
        info!(
            "Mock GPS provider: fetching {} for VIN {} from {} to {}",
            report_type,
            vin,
            start.format("%d-%m-%Y"),
            end.format("%d-%m-%Y")
        );
        self.simulate_delay(RANGE_LATENCY).await;
        // Time range queries return a single data point.
        Ok(Self::lookup_by_vin(vin, report_type))
    }

    async fn get_report_by_name(
        &self,
        report_type: ReportType,
        vehicle_name: &str,
    ) -> TelemetryResult<ReportPayload> {
        info!(
            "Mock GPS provider: fetching {} for vehicle name {}",
            report_type, vehicle_name
        );
        self.simulate_delay(DEFAULT_LATENCY).await;
        Ok(canned_report(report_type).only(vehicle_name))
    }

    async fn health_check(&self) -> bool {
        self.simulate_delay(HEALTH_LATENCY).await;
        true
    }

    fn provider_name(&self) -> &str {
        MOCK_PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authenticate() {
        let provider = MockGpsProvider::new(false);
        assert!(!provider.is_authenticated());
        assert!(provider.authenticate().await.unwrap());
        assert!(provider.is_authenticated());
        assert!(provider.health_check().await);
        assert_eq!(provider.provider_name(), "mock_gps_provider");
    }

    #[tokio::test]
    async fn test_known_vin_returns_canned_entry() {
        let provider = MockGpsProvider::new(false);
        let payload = provider
            .get_vehicle_data_by_vin("3KPA24BC4NE453663", ReportType::Odometros)
            .await
            .unwrap();

        assert_eq!(payload.len(), 1);
        assert_eq!(payload.parsed_data["1008"]["odo"], "70870 km");
    }

    #[tokio::test]
    async fn test_unknown_vin_gets_random_entry() {
        let provider = MockGpsProvider::new(false);
        let payload = provider
            .get_vehicle_data_by_vin("1HGCM82633A004352", ReportType::Speed)
            .await
            .unwrap();

        let (key, fields) = payload.find_by_vin("1HGCM82633A004352").unwrap();
        assert!(key.starts_with("rand_"));
        assert!(fields["speed"].as_str().unwrap().ends_with("km/h"));
    }

    #[tokio::test]
    async fn test_report_by_name() {
        let provider = MockGpsProvider::new(false);
        let payload = provider
            .get_report_by_name(ReportType::Voltage, "1009")
            .await
            .unwrap();
        assert_eq!(payload.parsed_data["1009"]["voltage"], "11.8 V");

        let missing = provider
            .get_report_by_name(ReportType::Voltage, "1011")
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_and_dated_reports() {
        let provider = MockGpsProvider::new(false);
        let bulk = provider.get_bulk_report(ReportType::LastPos).await.unwrap();
        assert_eq!(bulk.len(), 5);

        let date = NaiveDate::from_ymd_opt(2024, 8, 30).unwrap();
        let dated = provider
            .get_report_by_date(ReportType::Estacionamientos, date)
            .await
            .unwrap();
        assert_eq!(dated.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let provider = MockGpsProvider::new(true);
        let start = tokio::time::Instant::now();
        provider.health_check().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
