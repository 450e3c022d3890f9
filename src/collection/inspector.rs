use crate::telemetry::VehicleTelemetry;
use rust_decimal::Decimal;

/// Extra per-run counter a collection job reports in its execution metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordInspector {
    None,
    /// Records whose speed exceeds the configured threshold.
    SpeedViolations,
    /// Voltage readings outside the healthy range.
    LowVoltageAlerts,
}

impl RecordInspector {
    pub fn metadata_key(&self) -> Option<&'static str> {
        match self {
            RecordInspector::None => None,
            RecordInspector::SpeedViolations => Some("speed_violations"),
            RecordInspector::LowVoltageAlerts => Some("low_voltage_alerts"),
        }
    }

    pub fn count(&self, records: &[VehicleTelemetry], speed_threshold_kmh: Decimal) -> u64 {
        let matches = |record: &&VehicleTelemetry| match self {
            RecordInspector::None => false,
            RecordInspector::SpeedViolations => record
                .speed
                .as_ref()
                .is_some_and(|speed| speed.value > speed_threshold_kmh),
            RecordInspector::LowVoltageAlerts => record
                .voltage
                .as_ref()
                .is_some_and(|voltage| !voltage.is_healthy),
        };
        records.iter().filter(matches).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::Normalizer;
    use crate::telemetry::ReportType;
    use chrono::Utc;
    use serde_json::json;

    fn normalize(report_type: ReportType, fields: serde_json::Value) -> VehicleTelemetry {
        Normalizer::new("test")
            .normalize_vehicle(report_type, "1006", &fields, Utc::now())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_speed_violations() {
        let speed = |value: &str| {
            normalize(
                ReportType::Speed,
                json!({"VIN": "LSGHD52H9ND045496", "date": "2024-08-30T12:30:45", "speed": value}),
            )
        };
        let records = vec![speed("95 km/h"), speed("80 km/h")];
        let inspector = RecordInspector::SpeedViolations;
        assert_eq!(inspector.count(&records, Decimal::from(80)), 1);
        assert_eq!(inspector.metadata_key(), Some("speed_violations"));
    }

    #[test]
    fn test_low_voltage_alerts() {
        let voltage = |value: &str| {
            normalize(
                ReportType::Voltage,
                json!({"VIN": "LSGHD52H9ND045496", "voltage": value}),
            )
        };
        let records = vec![voltage("11.8 V"), voltage("12.4 V")];
        assert_eq!(
            RecordInspector::LowVoltageAlerts.count(&records, Decimal::from(80)),
            1
        );
        assert_eq!(RecordInspector::None.count(&records, Decimal::from(80)), 0);
    }
}
