use crate::config::AppConfig;
use crate::provider::GpsProvider;
use crate::telemetry_store::{TelemetryStore, VehicleDirectory};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains references to shared resources and a cancellation token
/// for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub provider: Arc<dyn GpsProvider>,

    /// Telemetry records and job execution logs.
    pub telemetry_store: Arc<dyn TelemetryStore>,

    /// Source of the VINs to collect.
    pub vehicle_directory: Arc<dyn VehicleDirectory>,

    pub config: Arc<AppConfig>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        provider: Arc<dyn GpsProvider>,
        telemetry_store: Arc<dyn TelemetryStore>,
        vehicle_directory: Arc<dyn VehicleDirectory>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            cancellation_token,
            provider,
            telemetry_store,
            vehicle_directory,
            config,
        }
    }

    /// Same resources, different cancellation token.
    pub fn with_cancellation_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
