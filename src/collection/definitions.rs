//! Built-in collection jobs: which report each one collects and when.

use super::inspector::RecordInspector;
use crate::telemetry::ReportType;

/// Static description of a scheduled collection job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionJobSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub report_type: ReportType,
    pub default_cron: &'static str,
    pub enabled_by_default: bool,
    pub inspector: RecordInspector,
}

pub const BUILTIN_COLLECTION_JOBS: &[CollectionJobSpec] = &[
    CollectionJobSpec {
        id: "vehicle_position_collection",
        name: "Vehicle Position Collection",
        description: "Collect the last known position of every active vehicle",
        report_type: ReportType::LastPos,
        default_cron: "*/5 * * * *",
        enabled_by_default: true,
        inspector: RecordInspector::None,
    },
    CollectionJobSpec {
        id: "odometer_collection",
        name: "Odometer Collection",
        description: "Collect odometer readings",
        report_type: ReportType::Odometros,
        default_cron: "0 */6 * * *",
        enabled_by_default: true,
        inspector: RecordInspector::None,
    },
    CollectionJobSpec {
        id: "engine_status_monitoring",
        name: "Engine Status Monitoring",
        description: "Collect engine on/off state",
        report_type: ReportType::EngineStatus,
        default_cron: "*/10 * * * *",
        enabled_by_default: true,
        inspector: RecordInspector::None,
    },
    CollectionJobSpec {
        id: "speed_monitoring",
        name: "Speed Monitoring",
        description: "Collect current speed and count speed violations",
        report_type: ReportType::Speed,
        default_cron: "*/5 * * * *",
        enabled_by_default: true,
        inspector: RecordInspector::SpeedViolations,
    },
    CollectionJobSpec {
        id: "ignition_monitoring",
        name: "Ignition Monitoring",
        description: "Collect ignition state",
        report_type: ReportType::Ignition,
        default_cron: "*/15 * * * *",
        enabled_by_default: true,
        inspector: RecordInspector::None,
    },
    CollectionJobSpec {
        id: "voltage_health_check",
        name: "Voltage Health Check",
        description: "Collect device voltage and count low voltage alerts",
        report_type: ReportType::Voltage,
        default_cron: "0 0 * * *",
        enabled_by_default: true,
        inspector: RecordInspector::LowVoltageAlerts,
    },
    CollectionJobSpec {
        id: "trip_summary_collection",
        name: "Trip Summary Collection",
        description: "Collect daily trip summaries",
        report_type: ReportType::Recorridos,
        default_cron: "0 1 * * *",
        enabled_by_default: false,
        inspector: RecordInspector::None,
    },
    CollectionJobSpec {
        id: "parking_events_collection",
        name: "Parking Events Collection",
        description: "Collect parking events",
        report_type: ReportType::Estacionamientos,
        default_cron: "0 2 * * *",
        enabled_by_default: false,
        inspector: RecordInspector::None,
    },
    CollectionJobSpec {
        id: "consumption_collection",
        name: "Consumption Collection",
        description: "Collect fuel consumption figures",
        report_type: ReportType::Consumos,
        default_cron: "0 */12 * * *",
        enabled_by_default: false,
        inspector: RecordInspector::None,
    },
];

pub fn find_collection_job(id: &str) -> Option<&'static CollectionJobSpec> {
    BUILTIN_COLLECTION_JOBS.iter().find(|spec| spec.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_job_ids_are_unique() {
        let ids: HashSet<_> = BUILTIN_COLLECTION_JOBS.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), BUILTIN_COLLECTION_JOBS.len());
    }

    #[test]
    fn test_no_job_collects_sin_mov() {
        assert!(BUILTIN_COLLECTION_JOBS
            .iter()
            .all(|s| s.report_type != ReportType::SinMov));
    }

    #[test]
    fn test_find_collection_job() {
        let spec = find_collection_job("speed_monitoring").unwrap();
        assert_eq!(spec.report_type, ReportType::Speed);
        assert_eq!(spec.inspector, RecordInspector::SpeedViolations);
        assert!(find_collection_job("unknown").is_none());
    }

    #[test]
    fn test_extra_jobs_disabled_by_default() {
        let disabled: Vec<_> = BUILTIN_COLLECTION_JOBS
            .iter()
            .filter(|s| !s.enabled_by_default)
            .map(|s| s.id)
            .collect();
        assert_eq!(
            disabled,
            vec![
                "trip_summary_collection",
                "parking_events_collection",
                "consumption_collection"
            ]
        );
    }
}
