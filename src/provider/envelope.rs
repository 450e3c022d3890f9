//! Provider response envelope and the report payload it carries.

use crate::error::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outer response returned by the provider API.
///
/// `body` is itself a JSON document encoded as a string.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: Map<String, Value>,
    pub body: String,
}

impl ProviderEnvelope {
    /// Check the embedded status and decode the body into a report payload.
    pub fn into_payload(self) -> TelemetryResult<ReportPayload> {
        match self.status_code {
            200..=299 => {}
            401 | 403 => {
                return Err(TelemetryError::ProviderAuth(format!(
                    "GPS API rejected credentials with status {}",
                    self.status_code
                )))
            }
            status => {
                return Err(TelemetryError::provider_status(
                    status,
                    format!("GPS API returned status {}: {}", status, self.body),
                ))
            }
        }

        serde_json::from_str(&self.body)
            .map_err(|e| TelemetryError::provider(format!("Malformed GPS API body: {}", e)))
    }
}

/// Decoded report: vehicle data keyed by the provider's opaque vehicle key.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReportPayload {
    #[serde(rename = "parsedData", default)]
    pub parsed_data: Map<String, Value>,
}

impl ReportPayload {
    pub fn single(vehicle_key: impl Into<String>, fields: Value) -> Self {
        let mut parsed_data = Map::new();
        parsed_data.insert(vehicle_key.into(), fields);
        Self { parsed_data }
    }

    pub fn is_empty(&self) -> bool {
        self.parsed_data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parsed_data.len()
    }

    /// Restrict the payload to one vehicle key, if present.
    pub fn only(&self, vehicle_key: &str) -> Self {
        match self.parsed_data.get(vehicle_key) {
            Some(fields) => Self::single(vehicle_key, fields.clone()),
            None => Self::default(),
        }
    }

    /// Find the vehicle entry whose `VIN` field matches.
    pub fn find_by_vin(&self, vin: &str) -> Option<(&String, &Value)> {
        self.parsed_data
            .iter()
            .find(|(_, fields)| fields.get("VIN").and_then(Value::as_str) == Some(vin))
    }
}
