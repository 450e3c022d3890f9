//! Canned fleet data served by the mock provider.

use super::envelope::ReportPayload;
use crate::telemetry::ReportType;
use chrono::{Duration as ChronoDuration, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::{json, Value};

/// The five demo vehicles: provider key and VIN.
pub const MOCK_FLEET: [(&str, &str); 5] = [
    ("1006", "LSGHD52H9ND045496"),
    ("1008", "3KPA24BC4NE453663"),
    ("1009", "3KPA24BC2NE460675"),
    ("1010", "MEX5B2605NT017117"),
    ("1011", "MEX5B2602NT012229"),
];

fn payload(entries: Value) -> ReportPayload {
    let parsed_data = match entries {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    ReportPayload { parsed_data }
}

/// Static report for `report_type`, empty for report types without canned data.
pub fn canned_report(report_type: ReportType) -> ReportPayload {
    match report_type {
        ReportType::LastPos => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "y": 19.899827, "x": -99.222737, "t": "2024-08-30T12:30:45.000"},
            "1008": {"VIN": "3KPA24BC4NE453663", "y": 19.340975, "x": -99.121057, "t": "2024-08-30T12:40:50.000"},
            "1009": {"VIN": "3KPA24BC2NE460675", "y": 19.365197, "x": -99.265575, "t": "2024-08-01T13:55:27.000"},
            "1010": {"VIN": "MEX5B2605NT017117", "y": 19.64507, "x": -99.17114, "t": "2024-08-30T12:41:04.000"},
            "1011": {"VIN": "MEX5B2602NT012229", "y": 19.397855, "x": -99.235578, "t": "2024-08-30T12:40:54.000"}
        })),
        ReportType::Odometros => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "odo": "111214 km"},
            "1008": {"VIN": "3KPA24BC4NE453663", "odo": "70870 km"},
            "1009": {"VIN": "3KPA24BC2NE460675", "odo": "117964 km"},
            "1010": {"VIN": "MEX5B2605NT017117", "odo": "45115 km"},
            "1011": {"VIN": "MEX5B2602NT012229", "odo": "96691 km"}
        })),
        ReportType::EngineStatus => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "engineStatus": "0"},
            "1008": {"VIN": "3KPA24BC4NE453663", "engineStatus": "0"},
            "1009": {"VIN": "3KPA24BC2NE460675", "engineStatus": "0"},
            "1010": {"VIN": "MEX5B2605NT017117", "engineStatus": "0"},
            "1011": {"VIN": "MEX5B2602NT012229", "engineStatus": "0"}
        })),
        ReportType::Ignition => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "date": "2024-08-30T12:30:45.000", "ignition": "0"},
            "1008": {"VIN": "3KPA24BC4NE453663", "date": "2024-08-30T12:39:50.000", "ignition": "1"},
            "1009": {"VIN": "3KPA24BC2NE460675", "date": "noDataInRange", "ignition": "0"},
            "1010": {"VIN": "MEX5B2605NT017117", "date": "2024-08-30T12:39:42.000", "ignition": "0"},
            "1011": {"VIN": "MEX5B2602NT012229", "date": "2024-08-30T12:39:47.000", "ignition": "1"}
        })),
        ReportType::Speed => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "date": "2024-08-30T12:30:45.000", "speed": "0 km/h"},
            "1008": {"VIN": "3KPA24BC4NE453663", "date": "2024-08-30T12:47:58.000", "speed": "0 km/h"},
            "1009": {"VIN": "3KPA24BC2NE460675", "date": "2024-08-01T13:55:27.000", "speed": "0 km/h"},
            "1010": {"VIN": "MEX5B2605NT017117", "date": "2024-08-30T12:46:38.000", "speed": "0 km/h"},
            "1011": {"VIN": "MEX5B2602NT012229", "date": "2024-08-30T12:46:48.000", "speed": "16 km/h"}
        })),
        ReportType::Recorridos => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "count": "3", "totalDuration": "3:02:43", "totalKm": "100 km"},
            "1008": {"VIN": "3KPA24BC4NE453663", "count": "14", "totalDuration": "3:51:42", "totalKm": "59 km"},
            "1009": {"VIN": "3KPA24BC2NE460675", "count": "0", "totalDuration": "0:00:00", "totalKm": "0.00 km"},
            "1010": {"VIN": "MEX5B2605NT017117", "count": "11", "totalDuration": "0:00:00", "totalKm": "0.00 km"},
            "1011": {"VIN": "MEX5B2602NT012229", "count": "12", "totalDuration": "8:04:33", "totalKm": "155 km"}
        })),
        ReportType::Estacionamientos => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "events": [{"duration": "4", "t": "noData", "y": "checkDayBefore", "x": "checkDayBefore"}]},
            "1008": {"VIN": "3KPA24BC4NE453663", "events": [{"duration": "14", "t": "noData", "y": "checkDayBefore", "x": "checkDayBefore"}]},
            "1009": {"VIN": "3KPA24BC2NE460675", "events": [{"duration": "0", "t": "noData", "y": "checkDayBefore", "x": "checkDayBefore"}]},
            "1010": {"VIN": "MEX5B2605NT017117", "events": [{"duration": "12", "t": "noData", "y": "checkDayBefore", "x": "checkDayBefore"}]}
        })),
        ReportType::Consumos => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "km": "", "timeOnMovement": "", "calculatedConsumption": "", "data": "noData"},
            "1008": {"VIN": "3KPA24BC4NE453663", "km": "", "timeOnMovement": "", "calculatedConsumption": "", "data": "noData"},
            "1009": {"VIN": "3KPA24BC2NE460675", "km": "", "timeOnMovement": "", "calculatedConsumption": "", "data": "noData"}
        })),
        ReportType::Voltage => payload(json!({
            "1006": {"VIN": "LSGHD52H9ND045496", "voltage": "12.6 V", "timestamp": "2024-08-30T12:30:45.000"},
            "1008": {"VIN": "3KPA24BC4NE453663", "voltage": "12.4 V", "timestamp": "2024-08-30T12:40:50.000"},
            "1009": {"VIN": "3KPA24BC2NE460675", "voltage": "11.8 V", "timestamp": "2024-08-01T13:55:27.000"}
        })),
        ReportType::SinMov => ReportPayload::default(),
    }
}

fn random_duration<R: Rng>(rng: &mut R, max_hours: u32) -> String {
    format!(
        "{}:{:02}:{:02}",
        rng.random_range(0..=max_hours),
        rng.random_range(0..60),
        rng.random_range(0..60)
    )
}

/// Plausible random fields for a VIN the canned data does not know.
pub fn random_vehicle_fields(vin: &str, report_type: ReportType) -> Option<Value> {
    let mut rng = rand::rng();
    let recorded = Utc::now() - ChronoDuration::hours(rng.random_range(0..=24));
    let timestamp = recorded.format("%Y-%m-%dT%H:%M:%S.000").to_string();

    let fields = match report_type {
        ReportType::LastPos => json!({
            "VIN": vin,
            "y": 19.4326 + rng.random_range(-0.5..0.5),
            "x": -99.1332 + rng.random_range(-0.5..0.5),
            "t": timestamp,
        }),
        ReportType::Odometros => json!({
            "VIN": vin,
            "odo": format!("{} km", rng.random_range(10_000..=200_000)),
        }),
        ReportType::EngineStatus => json!({
            "VIN": vin,
            "engineStatus": rng.random_range(0..=1).to_string(),
        }),
        ReportType::Ignition => json!({
            "VIN": vin,
            "date": timestamp,
            "ignition": rng.random_range(0..=1).to_string(),
        }),
        ReportType::Speed => json!({
            "VIN": vin,
            "date": timestamp,
            "speed": format!("{} km/h", rng.random_range(0..=120)),
        }),
        ReportType::Recorridos => json!({
            "VIN": vin,
            "count": rng.random_range(0..=20).to_string(),
            "totalDuration": random_duration(&mut rng, 12),
            "totalKm": format!("{} km", rng.random_range(0..=500)),
        }),
        ReportType::Estacionamientos => json!({
            "VIN": vin,
            "events": [{
                "duration": rng.random_range(1..=24).to_string(),
                "t": "noData",
                "y": "checkDayBefore",
                "x": "checkDayBefore",
            }],
        }),
        ReportType::Consumos => {
            let km = if rng.random_bool(0.5) {
                format!("{} km", rng.random_range(0..=100))
            } else {
                String::new()
            };
            let moving = if rng.random_bool(0.5) {
                random_duration(&mut rng, 8)
            } else {
                String::new()
            };
            let consumption = if rng.random_bool(0.5) {
                format!("{:.1} L/100km", rng.random_range(5.0..15.0))
            } else {
                String::new()
            };
            let data = ["noData", "available"]
                .choose(&mut rng)
                .copied()
                .unwrap_or("noData");
            json!({
                "VIN": vin,
                "km": km,
                "timeOnMovement": moving,
                "calculatedConsumption": consumption,
                "data": data,
            })
        }
        ReportType::Voltage => json!({
            "VIN": vin,
            "voltage": format!("{:.1} V", rng.random_range(11.5..13.0)),
            "timestamp": timestamp,
        }),
        ReportType::SinMov => return None,
    };
    Some(fields)
}
