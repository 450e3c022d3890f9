//! One mapping function per report type.
//!
//! Every function takes the raw fields of a single vehicle and returns
//! `Ok(None)` when the record must be dropped (no VIN, or no timestamp for a
//! report type that needs one) and `Err` when the payload is malformed.

use super::parsing::{
    field_text, parse_decimal_field, parse_duration, parse_timestamp_field, parse_unit_field,
};
use crate::error::{TelemetryError, TelemetryResult};
use crate::telemetry::{
    ConsumptionData, DataQuality, EventType, GeoLocation, IngestionMetadata, IngestionStatus,
    ParkingEvent, Reading, ReportType, SwitchState, TripSummary, VehicleTelemetry,
    VoltageReading,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

pub const VIN_LENGTH: usize = 17;
pub const CONSUMPTION_UNIT: &str = "L/100km";

/// Closed healthy range for a 12 V battery.
pub fn voltage_is_healthy(value: Decimal) -> bool {
    value >= Decimal::new(120, 1) && value <= Decimal::new(130, 1)
}

/// Everything a mapping function needs for one vehicle.
pub struct VehicleInput<'a> {
    pub vehicle_key: &'a str,
    pub fields: &'a Value,
    pub report_type: ReportType,
    pub provider_name: &'a str,
    pub now: DateTime<Utc>,
}

impl VehicleInput<'_> {
    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// `Ok(None)` when the VIN is absent, `Err` when it is not a valid VIN.
    fn vin(&self) -> TelemetryResult<Option<String>> {
        let Some(vin) = field_text(self.field("VIN")) else {
            return Ok(None);
        };
        if vin.len() != VIN_LENGTH || !vin.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TelemetryError::Normalization(format!(
                "Invalid VIN '{}' for vehicle {}",
                vin, self.vehicle_key
            )));
        }
        Ok(Some(vin))
    }

    fn malformed(&self, what: &str) -> TelemetryError {
        TelemetryError::Normalization(format!(
            "{} for vehicle {} in {} report",
            what, self.vehicle_key, self.report_type
        ))
    }

    fn metadata(&self, quality: DataQuality) -> IngestionMetadata {
        IngestionMetadata {
            provider_name: self.provider_name.to_string(),
            report_type: self.report_type,
            ingestion_timestamp: self.now,
            status: IngestionStatus::Success,
            quality,
            raw_payload: Some(self.fields.clone()),
            error_message: None,
            retry_count: 0,
        }
    }

    fn record(
        &self,
        vin: String,
        event_type: EventType,
        quality: DataQuality,
        recorded_at: DateTime<Utc>,
    ) -> VehicleTelemetry {
        let metadata = self.metadata(quality);
        let mut record = VehicleTelemetry::new(vin, event_type, metadata, recorded_at);
        record.vehicle_name = Some(self.vehicle_key.to_string());
        record
    }

    fn switch(&self, name: &str) -> TelemetryResult<SwitchState> {
        let flag = field_text(self.field(name)).unwrap_or_else(|| "0".to_string());
        SwitchState::from_flag(&flag)
            .ok_or_else(|| self.malformed(&format!("Invalid {} flag '{}'", name, flag)))
    }
}

pub type MappedRecord = TelemetryResult<Option<VehicleTelemetry>>;

pub fn last_pos(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let Some(recorded_at) = parse_timestamp_field(input.field("t")) else {
        return Ok(None);
    };

    let latitude = parse_decimal_field(input.field("y"))
        .filter(|lat| lat.abs() <= Decimal::from(90))
        .ok_or_else(|| input.malformed("Missing or invalid latitude"))?;
    let longitude = parse_decimal_field(input.field("x"))
        .filter(|lon| lon.abs() <= Decimal::from(180))
        .ok_or_else(|| input.malformed("Missing or invalid longitude"))?;

    let mut record = input.record(vin, EventType::PositionUpdate, DataQuality::High, recorded_at);
    record.location = Some(GeoLocation {
        latitude,
        longitude,
        timestamp: recorded_at,
    });
    Ok(Some(record))
}

pub fn odometros(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let Some(value) = parse_unit_field(input.field("odo")) else {
        return Ok(None);
    };

    let mut record = input.record(vin, EventType::OdometerUpdate, DataQuality::High, input.now);
    record.odometer = Some(Reading {
        value,
        unit: "km".to_string(),
        timestamp: input.now,
    });
    Ok(Some(record))
}

pub fn engine_status(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let status = input.switch("engineStatus")?;

    let mut record = input.record(
        vin,
        EventType::EngineStatusChange,
        DataQuality::High,
        input.now,
    );
    record.engine_status = Some(status);
    Ok(Some(record))
}

pub fn ignition(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let recorded_at = parse_timestamp_field(input.field("date")).unwrap_or(input.now);
    let status = input.switch("ignition")?;

    let mut record = input.record(vin, EventType::IgnitionChange, DataQuality::High, recorded_at);
    record.ignition_status = Some(status);
    Ok(Some(record))
}

pub fn speed(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let Some(recorded_at) = parse_timestamp_field(input.field("date")) else {
        return Ok(None);
    };
    let value = parse_unit_field(input.field("speed")).unwrap_or(Decimal::ZERO);

    let mut record = input.record(vin, EventType::PositionUpdate, DataQuality::High, recorded_at);
    record.speed = Some(Reading {
        value,
        unit: "km/h".to_string(),
        timestamp: recorded_at,
    });
    Ok(Some(record))
}

pub fn recorridos(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let count = match field_text(input.field("count")) {
        Some(text) => text
            .parse::<u32>()
            .map_err(|_| input.malformed(&format!("Invalid trip count '{}'", text)))?,
        None => 0,
    };
    let total_duration_seconds = field_text(input.field("totalDuration"))
        .and_then(|text| parse_duration(&text));

    let mut record = input.record(vin, EventType::TripCompleted, DataQuality::High, input.now);
    record.trips = Some(TripSummary {
        count,
        total_duration_seconds,
        total_distance_km: parse_unit_field(input.field("totalKm")),
    });
    Ok(Some(record))
}

fn parking_event(event: &Value, now: DateTime<Utc>) -> ParkingEvent {
    let duration_hours = parse_decimal_field(event.get("duration")).unwrap_or(Decimal::ZERO);
    let start_time = parse_timestamp_field(event.get("t"));
    let location = match (
        parse_decimal_field(event.get("y")),
        parse_decimal_field(event.get("x")),
    ) {
        (Some(latitude), Some(longitude)) => Some(GeoLocation {
            latitude,
            longitude,
            timestamp: start_time.unwrap_or(now),
        }),
        _ => None,
    };
    let end_time = start_time.and_then(|start| {
        let seconds = (duration_hours * Decimal::from(3600)).to_i64()?;
        Some(start + ChronoDuration::seconds(seconds))
    });

    ParkingEvent {
        duration_hours,
        location,
        start_time,
        end_time,
    }
}

pub fn estacionamientos(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let events = match input.field("events") {
        Some(Value::Array(events)) => events
            .iter()
            .map(|event| parking_event(event, input.now))
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(input.malformed("Parking events are not a list")),
    };

    let mut record = input.record(vin, EventType::ParkingEvent, DataQuality::Medium, input.now);
    record.parking_events = Some(events);
    Ok(Some(record))
}

pub fn consumos(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let no_data = match input.field("data").and_then(Value::as_str) {
        Some(marker) => marker.trim() == "noData",
        None => true,
    };
    let quality = if no_data {
        DataQuality::NoData
    } else {
        DataQuality::High
    };

    let mut record = input.record(vin, EventType::PositionUpdate, quality, input.now);
    record.consumption = Some(ConsumptionData {
        distance_km: parse_unit_field(input.field("km")),
        time_on_movement_seconds: field_text(input.field("timeOnMovement"))
            .and_then(|text| parse_duration(&text)),
        calculated_consumption: parse_unit_field(input.field("calculatedConsumption")),
        unit: CONSUMPTION_UNIT.to_string(),
    });
    Ok(Some(record))
}

pub fn voltage(input: &VehicleInput) -> MappedRecord {
    let Some(vin) = input.vin()? else {
        return Ok(None);
    };
    let Some(value) = parse_unit_field(input.field("voltage")) else {
        return Ok(None);
    };
    let recorded_at = parse_timestamp_field(input.field("timestamp")).unwrap_or(input.now);
    let is_healthy = voltage_is_healthy(value);
    let event_type = if is_healthy {
        EventType::PositionUpdate
    } else {
        EventType::VoltageAlert
    };

    let mut record = input.record(vin, event_type, DataQuality::High, recorded_at);
    record.voltage = Some(VoltageReading {
        value,
        unit: "V".to_string(),
        timestamp: recorded_at,
        is_healthy,
    });
    Ok(Some(record))
}
