//! Provider backed by the real GPS HTTP API.

use super::envelope::ReportPayload;
use super::transport::Transport;
use super::GpsProvider;
use crate::error::{TelemetryError, TelemetryResult};
use crate::telemetry::{ReportType, SearchType};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub const HTTP_PROVIDER_NAME: &str = "gps_http_provider";

/// Request body accepted by the provider endpoint.
#[derive(Debug, Serialize)]
struct ReportRequest<'a> {
    user: &'a str,
    password: &'a str,
    #[serde(rename = "reportType")]
    report_type: ReportType,
    #[serde(rename = "searchType")]
    search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    vin: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "startDate", skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(rename = "endDate", skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    user: &'a str,
    password: &'a str,
}

/// Dates travel as `DD-MM-YYYY`.
fn format_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

pub struct HttpGpsProvider {
    transport: Transport,
    username: String,
    password: String,
    authenticated: AtomicBool,
}

impl HttpGpsProvider {
    pub fn new(transport: Transport, username: String, password: String) -> Self {
        Self {
            transport,
            username,
            password,
            authenticated: AtomicBool::new(false),
        }
    }

    /// Whether the last authentication attempt was accepted.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn request(&self, report_type: ReportType, search_type: SearchType) -> ReportRequest<'_> {
        ReportRequest {
            user: &self.username,
            password: &self.password,
            report_type,
            search_type,
            vin: None,
            name: None,
            start_date: None,
            end_date: None,
        }
    }

    async fn fetch(&self, request: ReportRequest<'_>) -> TelemetryResult<ReportPayload> {
        let body = serde_json::to_value(&request)
            .map_err(|e| TelemetryError::provider(format!("Cannot encode request: {}", e)))?;
        let envelope = self.transport.send(&body).await?;
        envelope.into_payload()
    }
}

#[async_trait]
impl GpsProvider for HttpGpsProvider {
    async fn authenticate(&self) -> TelemetryResult<bool> {
        let body = serde_json::to_value(AuthRequest {
            user: &self.username,
            password: &self.password,
        })
        .map_err(|e| TelemetryError::provider(format!("Cannot encode request: {}", e)))?;

        // Rejected credentials surface either as an HTTP status or inside the envelope.
        let result = self
            .transport
            .send(&body)
            .await
            .and_then(|envelope| envelope.into_payload());
        match result {
            Ok(_) => {
                info!("Authenticated against GPS API");
                self.authenticated.store(true, Ordering::SeqCst);
                Ok(true)
            }
            Err(TelemetryError::ProviderAuth(msg)) => {
                warn!("GPS API authentication rejected: {}", msg);
                self.authenticated.store(false, Ordering::SeqCst);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_vehicle_data_by_vin(
        &self,
        vin: &str,
        report_type: ReportType,
    ) -> TelemetryResult<ReportPayload> {
        let mut request = self.request(report_type, SearchType::ByVin);
        request.vin = Some(vin);
        self.fetch(request).await
    }

    async fn get_bulk_report(&self, report_type: ReportType) -> TelemetryResult<ReportPayload> {
        let today = Utc::now().date_naive();
        self.get_report_by_date(report_type, today).await
    }

    async fn get_report_by_date(
        &self,
        report_type: ReportType,
        date: NaiveDate,
    ) -> TelemetryResult<ReportPayload> {
        let mut request = self.request(report_type, SearchType::ByDay);
        request.start_date = Some(format_date(date));
        self.fetch(request).await
    }

    async fn get_report_by_time_range(
        &self,
        report_type: ReportType,
        vin: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TelemetryResult<ReportPayload> {
        let mut request = self.request(report_type, SearchType::ByTimeRange);
        request.vin = Some(vin);
        request.start_date = Some(format_date(start.date_naive()));
        request.end_date = Some(format_date(end.date_naive()));
        self.fetch(request).await
    }

    async fn get_report_by_name(
        &self,
        report_type: ReportType,
        vehicle_name: &str,
    ) -> TelemetryResult<ReportPayload> {
        let mut request = self.request(report_type, SearchType::ByName);
        request.name = Some(vehicle_name);
        self.fetch(request).await
    }

    async fn health_check(&self) -> bool {
        match self.authenticate().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("GPS API health check failed: {}", e);
                false
            }
        }
    }

    fn provider_name(&self) -> &str {
        HTTP_PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::envelope::ProviderEnvelope;
    use crate::provider::rate_limiter::RateLimiter;
    use crate::provider::retry_policy::RetryPolicy;
    use crate::provider::transport::Connection;
    use serde_json::{Map, Value};
    use std::sync::{Arc, Mutex};

    /// Records request bodies and answers with a fixed envelope.
    struct RecordingConnection {
        requests: Mutex<Vec<Value>>,
        status: u16,
        body: String,
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn post(&self, body: &Value) -> TelemetryResult<ProviderEnvelope> {
            self.requests.lock().unwrap().push(body.clone());
            Ok(ProviderEnvelope {
                status_code: self.status,
                headers: Map::new(),
                body: self.body.clone(),
            })
        }
    }

    fn provider(status: u16, body: &str) -> (HttpGpsProvider, Arc<RecordingConnection>) {
        let connection = Arc::new(RecordingConnection {
            requests: Mutex::new(Vec::new()),
            status,
            body: body.to_string(),
        });
        let transport = Transport::new(
            connection.clone(),
            Arc::new(RateLimiter::new(50.0)),
            RetryPolicy::default(),
            2,
        );
        (
            HttpGpsProvider::new(transport, "fleet".into(), "secret".into()),
            connection,
        )
    }

    #[tokio::test]
    async fn test_by_vin_request_shape() {
        let body = r#"{"parsedData":{"1006":{"VIN":"LSGHD52H9ND045496","odo":"111214 km"}}}"#;
        let (provider, connection) = provider(200, body);

        let payload = provider
            .get_vehicle_data_by_vin("LSGHD52H9ND045496", ReportType::Odometros)
            .await
            .unwrap();
        assert_eq!(payload.len(), 1);

        let sent = connection.requests.lock().unwrap()[0].clone();
        assert_eq!(sent["user"], "fleet");
        assert_eq!(sent["reportType"], "odometros");
        assert_eq!(sent["searchType"], "searchByVIN");
        assert_eq!(sent["vin"], "LSGHD52H9ND045496");
        assert!(sent.get("startDate").is_none());
    }

    #[tokio::test]
    async fn test_time_range_dates_are_day_first() {
        let (provider, connection) = provider(200, r#"{"parsedData":{}}"#);
        let start = DateTime::parse_from_rfc3339("2024-08-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2024-08-30T23:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        provider
            .get_report_by_time_range(ReportType::Recorridos, "MEX5B2602NT012229", start, end)
            .await
            .unwrap();

        let sent = connection.requests.lock().unwrap()[0].clone();
        assert_eq!(sent["searchType"], "searchByTimeRange");
        assert_eq!(sent["startDate"], "01-08-2024");
        assert_eq!(sent["endDate"], "30-08-2024");
    }

    /// Fails every request at the HTTP layer.
    struct UnauthorizedConnection;

    #[async_trait]
    impl Connection for UnauthorizedConnection {
        async fn post(&self, _body: &Value) -> TelemetryResult<ProviderEnvelope> {
            Err(TelemetryError::ProviderAuth(
                "GPS API returned status 401 Unauthorized".into(),
            ))
        }
    }

    #[tokio::test]
    async fn test_authenticate_success_is_remembered() {
        let (provider, _) = provider(200, r#"{"parsedData":{}}"#);
        assert!(!provider.is_authenticated());
        assert!(provider.authenticate().await.unwrap());
        assert!(provider.is_authenticated());
    }

    #[tokio::test]
    async fn test_http_level_rejection_is_not_an_error() {
        let transport = Transport::new(
            Arc::new(UnauthorizedConnection),
            Arc::new(RateLimiter::new(50.0)),
            RetryPolicy::default(),
            2,
        );
        let provider = HttpGpsProvider::new(transport, "fleet".into(), "wrong".into());

        assert!(!provider.authenticate().await.unwrap());
        assert!(!provider.is_authenticated());
        assert!(!provider.health_check().await);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let (provider, _) = provider(401, "");
        assert!(!provider.authenticate().await.unwrap());
        assert!(!provider.is_authenticated());
        assert!(!provider.health_check().await);

        let err = provider
            .get_report_by_name(ReportType::Speed, "1008")
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::ProviderAuth(_)));
    }
}
