//! Error taxonomy shared by the provider, normalization and collection layers.

use thiserror::Error;

/// Errors raised while talking to the provider or processing its data.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Permanent provider failure, e.g. a non-2xx status.
    #[error("GPS provider error: {message}")]
    Provider {
        message: String,
        status_code: Option<u16>,
    },

    #[error("GPS provider request timed out: {0}")]
    ProviderTimeout(String),

    #[error("GPS provider connection failed: {0}")]
    ProviderConnection(String),

    #[error("GPS provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Job execution error: {0}")]
    JobExecution(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),
}

impl TelemetryError {
    pub fn provider(message: impl Into<String>) -> Self {
        TelemetryError::Provider {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn provider_status(status_code: u16, message: impl Into<String>) -> Self {
        TelemetryError::Provider {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Whether the transport should try the request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelemetryError::ProviderTimeout(_) | TelemetryError::ProviderConnection(_)
        )
    }

    /// Errors that invalidate a whole job run rather than a single vehicle.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            TelemetryError::ProviderAuth(_) | TelemetryError::Configuration(_)
        )
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(TelemetryError::ProviderTimeout("read".into()).is_retryable());
        assert!(TelemetryError::ProviderConnection("refused".into()).is_retryable());
        assert!(!TelemetryError::provider_status(500, "boom").is_retryable());
        assert!(!TelemetryError::ProviderAuth("bad credentials".into()).is_retryable());
        assert!(!TelemetryError::Normalization("bad".into()).is_retryable());
    }

    #[test]
    fn test_critical_classification() {
        assert!(TelemetryError::ProviderAuth("denied".into()).is_critical());
        assert!(!TelemetryError::provider("gone").is_critical());
        assert!(!TelemetryError::ProviderTimeout("slow".into()).is_critical());
    }

    #[test]
    fn test_display() {
        let err = TelemetryError::provider_status(404, "GPS API returned status 404");
        assert_eq!(err.to_string(), "GPS provider error: GPS API returned status 404");

        let err = TelemetryError::Store(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "Store error: disk full");
    }
}
