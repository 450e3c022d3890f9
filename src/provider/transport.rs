//! Rate-limited, retrying request executor for the provider API.

use super::envelope::ProviderEnvelope;
use super::rate_limiter::RateLimiter;
use super::retry_policy::RetryPolicy;
use crate::error::{TelemetryError, TelemetryResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// One network round trip to the provider, without retries.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn post(&self, body: &Value) -> TelemetryResult<ProviderEnvelope>;
}

/// Connection backed by a pooled reqwest client.
#[derive(Clone)]
pub struct HttpConnection {
    client: Client,
    url: String,
}

impl HttpConnection {
    /// Create a new HttpConnection.
    ///
    /// # Arguments
    /// * `url` - Full endpoint URL (base URL joined with the endpoint path)
    /// * `timeout_secs` - Per-request timeout in seconds
    /// * `max_connections` - Idle connections kept per host
    pub fn new(url: String, timeout_secs: u64, max_connections: usize) -> TelemetryResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(max_connections)
            .build()
            .map_err(|e| TelemetryError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> TelemetryError {
        if err.is_timeout() {
            TelemetryError::ProviderTimeout(format!("Request to {} timed out: {}", self.url, err))
        } else if err.is_connect() {
            TelemetryError::ProviderConnection(format!("Connect to {} failed: {}", self.url, err))
        } else {
            TelemetryError::provider(format!("Request to {} failed: {}", self.url, err))
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn post(&self, body: &Value) -> TelemetryResult<ProviderEnvelope> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TelemetryError::ProviderAuth(format!(
                "GPS API returned status {}",
                status
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TelemetryError::provider_status(
                status.as_u16(),
                format!("GPS API returned status {}: {}", status, text),
            ));
        }

        response.json::<ProviderEnvelope>().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(e)
            } else {
                TelemetryError::provider(format!("Malformed GPS API response: {}", e))
            }
        })
    }
}

/// Wraps a [`Connection`] with admission control and retries.
///
/// Every attempt takes a rate limiter token and an in-flight permit first.
/// Transient failures are retried with exponential backoff; anything else
/// is returned immediately.
pub struct Transport {
    connection: Arc<dyn Connection>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    in_flight: Semaphore,
}

impl Transport {
    pub fn new(
        connection: Arc<dyn Connection>,
        rate_limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
        max_concurrency: usize,
    ) -> Self {
        Self {
            connection,
            rate_limiter,
            retry_policy,
            in_flight: Semaphore::new(max_concurrency.max(1)),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Send one logical request, retrying transient failures.
    pub async fn send(&self, body: &Value) -> TelemetryResult<ProviderEnvelope> {
        let mut attempts_made = 0u32;
        loop {
            self.rate_limiter.acquire().await;
            let result = {
                let _permit = self
                    .in_flight
                    .acquire()
                    .await
                    .map_err(|_| TelemetryError::provider("Transport is closed"))?;
                self.connection.post(body).await
            };
            attempts_made += 1;

            match result {
                Ok(envelope) => {
                    if attempts_made > 1 {
                        debug!("Provider request succeeded after {} attempts", attempts_made);
                    }
                    return Ok(envelope);
                }
                Err(e) if self.retry_policy.should_retry(&e, attempts_made) => {
                    let delay = self.retry_policy.delay(attempts_made - 1);
                    warn!(
                        "Provider request failed (attempt {}/{}): {}, retrying in {:?}",
                        attempts_made, self.retry_policy.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails transiently `failures` times, then succeeds.
    struct FlakyConnection {
        failures: usize,
        calls: AtomicUsize,
        call_times: Mutex<Vec<Instant>>,
        error: fn() -> TelemetryError,
    }

    impl FlakyConnection {
        fn new(failures: usize, error: fn() -> TelemetryError) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                call_times: Mutex::new(Vec::new()),
                error,
            }
        }
    }

    #[async_trait]
    impl Connection for FlakyConnection {
        async fn post(&self, _body: &Value) -> TelemetryResult<ProviderEnvelope> {
            self.call_times.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            Ok(ProviderEnvelope {
                status_code: 200,
                headers: Map::new(),
                body: "{\"parsedData\":{}}".to_string(),
            })
        }
    }

    fn timeout() -> TelemetryError {
        TelemetryError::ProviderTimeout("read timeout".into())
    }

    fn server_error() -> TelemetryError {
        TelemetryError::provider_status(502, "bad gateway")
    }

    fn transport(connection: Arc<FlakyConnection>, max_attempts: u32) -> Transport {
        Transport::new(
            connection,
            Arc::new(RateLimiter::new(100.0)),
            RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
            4,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let connection = Arc::new(FlakyConnection::new(2, timeout));
        let transport = transport(connection.clone(), 3);

        let envelope = transport.send(&json!({})).await.unwrap();
        assert_eq!(envelope.status_code, 200);
        assert_eq!(connection.calls.load(Ordering::SeqCst), 3);

        let times = connection.call_times.lock().unwrap().clone();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_secs(1));
        assert!(gaps[1] >= gaps[0]);
        assert!(gaps.iter().all(|g| *g <= Duration::from_secs(31)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let connection = Arc::new(FlakyConnection::new(10, timeout));
        let transport = transport(connection.clone(), 3);

        let err = transport.send(&json!({})).await.unwrap_err();
        assert!(matches!(err, TelemetryError::ProviderTimeout(_)));
        assert_eq!(connection.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let connection = Arc::new(FlakyConnection::new(1, server_error));
        let transport = transport(connection.clone(), 3);

        let err = transport.send(&json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Provider {
                status_code: Some(502),
                ..
            }
        ));
        assert_eq!(connection.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_capped_at_maximum() {
        let connection = Arc::new(FlakyConnection::new(7, timeout));
        let transport = Transport::new(
            connection.clone(),
            Arc::new(RateLimiter::new(100.0)),
            RetryPolicy {
                max_attempts: 8,
                max_backoff_secs: 5.0,
                ..RetryPolicy::default()
            },
            1,
        );

        transport.send(&json!({})).await.unwrap();
        assert_eq!(connection.calls.load(Ordering::SeqCst), 8);

        let times = connection.call_times.lock().unwrap().clone();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in gaps.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(gaps.iter().all(|g| *g < Duration::from_millis(5100)));
    }

    #[test]
    fn test_http_connection_builds() {
        let connection = HttpConnection::new("http://localhost:3000/prod/prod".into(), 30, 10);
        assert_eq!(connection.unwrap().url(), "http://localhost:3000/prod/prod");
    }
}
