//! Conversion of provider payloads into canonical telemetry records.

mod parsing;
mod reports;

pub use parsing::{
    field_text, is_sentinel, parse_duration, parse_timestamp, parse_unit_value, SENTINELS,
};
pub use reports::{voltage_is_healthy, CONSUMPTION_UNIT, VIN_LENGTH};

use crate::error::{TelemetryError, TelemetryResult};
use crate::provider::ReportPayload;
use crate::telemetry::{ReportType, VehicleTelemetry};
use chrono::{DateTime, Utc};
use reports::{MappedRecord, VehicleInput};
use serde_json::Value;
use tracing::{debug, error, warn};

/// The mapping function for a report type, or `None` for report types the
/// provider exposes but that carry nothing to normalize.
fn mapper(report_type: ReportType) -> Option<fn(&VehicleInput) -> MappedRecord> {
    match report_type {
        ReportType::LastPos => Some(reports::last_pos),
        ReportType::Odometros => Some(reports::odometros),
        ReportType::EngineStatus => Some(reports::engine_status),
        ReportType::Ignition => Some(reports::ignition),
        ReportType::Speed => Some(reports::speed),
        ReportType::Recorridos => Some(reports::recorridos),
        ReportType::Estacionamientos => Some(reports::estacionamientos),
        ReportType::Consumos => Some(reports::consumos),
        ReportType::Voltage => Some(reports::voltage),
        ReportType::SinMov => None,
    }
}

/// Stateless normalizer tagged with the provider the data came from.
#[derive(Debug, Clone)]
pub struct Normalizer {
    provider_name: String,
}

impl Normalizer {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Normalize one vehicle's raw fields.
    ///
    /// `Ok(None)` means the record was dropped; `Err` means the fields were malformed.
    pub fn normalize_vehicle(
        &self,
        report_type: ReportType,
        vehicle_key: &str,
        fields: &Value,
        now: DateTime<Utc>,
    ) -> TelemetryResult<Option<VehicleTelemetry>> {
        let map = mapper(report_type).ok_or_else(|| {
            TelemetryError::Normalization(format!(
                "No normalization method for report type: {}",
                report_type
            ))
        })?;
        map(&VehicleInput {
            vehicle_key,
            fields,
            report_type,
            provider_name: &self.provider_name,
            now,
        })
    }

    pub fn normalize_report(
        &self,
        report_type: ReportType,
        payload: &ReportPayload,
    ) -> TelemetryResult<Vec<VehicleTelemetry>> {
        self.normalize_report_at(report_type, payload, Utc::now())
    }

    /// Normalize every vehicle in `payload`, using `now` as the ingestion time.
    ///
    /// A malformed vehicle is logged and skipped; only an unsupported report
    /// type fails the whole payload.
    pub fn normalize_report_at(
        &self,
        report_type: ReportType,
        payload: &ReportPayload,
        now: DateTime<Utc>,
    ) -> TelemetryResult<Vec<VehicleTelemetry>> {
        if mapper(report_type).is_none() {
            return Err(TelemetryError::Normalization(format!(
                "No normalization method for report type: {}",
                report_type
            )));
        }
        if payload.is_empty() {
            warn!("No parsed data found for report type {}", report_type);
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(payload.len());
        for (vehicle_key, fields) in &payload.parsed_data {
            match self.normalize_vehicle(report_type, vehicle_key, fields, now) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(
                    "Dropped {} record for vehicle {}: no VIN or timestamp",
                    report_type, vehicle_key
                ),
                Err(e) => error!("Failed to normalize data for vehicle {}: {}", vehicle_key, e),
            }
        }

        debug!("Normalized {} records for {}", records.len(), report_type);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock_data::canned_report;
    use crate::telemetry::{DataQuality, EventType};
    use rust_decimal::Decimal;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new("mock_gps_provider")
    }

    #[test]
    fn test_every_canned_report_normalizes() {
        let normalizer = normalizer();
        let expected = [
            (ReportType::LastPos, 5),
            (ReportType::Odometros, 5),
            (ReportType::EngineStatus, 5),
            (ReportType::Ignition, 5),
            (ReportType::Speed, 5),
            (ReportType::Recorridos, 5),
            (ReportType::Estacionamientos, 4),
            (ReportType::Consumos, 3),
            (ReportType::Voltage, 3),
        ];
        for (report_type, count) in expected {
            let records = normalizer
                .normalize_report(report_type, &canned_report(report_type))
                .unwrap();
            assert_eq!(records.len(), count, "{}", report_type);
            assert!(records.iter().all(|r| r.vin.len() == VIN_LENGTH));
            assert!(records.iter().all(|r| r.metadata.report_type == report_type));
        }
    }

    #[test]
    fn test_sin_mov_is_not_normalizable() {
        let err = normalizer()
            .normalize_report(ReportType::SinMov, &ReportPayload::default())
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Normalization(_)));
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let normalizer = normalizer();
        let now = Utc::now();
        for report_type in ReportType::ALL {
            if report_type == ReportType::SinMov {
                continue;
            }
            let payload = canned_report(report_type);
            let first = normalizer.normalize_report_at(report_type, &payload, now).unwrap();
            let second = normalizer.normalize_report_at(report_type, &payload, now).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_bad_vehicle_does_not_abort_payload() {
        let payload = ReportPayload {
            parsed_data: json!({
                "1006": {"VIN": "LSGHD52H9ND045496", "odo": "111214 km"},
                "1008": {"VIN": "short", "odo": "70870 km"},
                "1009": {"odo": "117964 km"}
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        let records = normalizer()
            .normalize_report(ReportType::Odometros, &payload)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vin, "LSGHD52H9ND045496");
        assert_eq!(records[0].odometer.as_ref().unwrap().value, Decimal::from(111214));
        assert_eq!(records[0].vehicle_name.as_deref(), Some("1006"));
    }

    #[test]
    fn test_canned_voltage_health() {
        let records = normalizer()
            .normalize_report(ReportType::Voltage, &canned_report(ReportType::Voltage))
            .unwrap();
        let unhealthy: Vec<_> = records
            .iter()
            .filter(|r| r.event_type == EventType::VoltageAlert)
            .map(|r| r.vin.as_str())
            .collect();
        assert_eq!(unhealthy, vec!["3KPA24BC2NE460675"]);
    }

    #[test]
    fn test_ignition_no_data_in_range_uses_ingestion_time() {
        let now = Utc::now();
        let records = normalizer()
            .normalize_report_at(ReportType::Ignition, &canned_report(ReportType::Ignition), now)
            .unwrap();
        let record = records
            .iter()
            .find(|r| r.vin == "3KPA24BC2NE460675")
            .unwrap();
        assert_eq!(record.recorded_at, now);
    }

    #[test]
    fn test_consumption_quality_is_no_data() {
        let records = normalizer()
            .normalize_report(ReportType::Consumos, &canned_report(ReportType::Consumos))
            .unwrap();
        assert!(records
            .iter()
            .all(|r| r.metadata.quality == DataQuality::NoData));
    }
}
