use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Enumerations
// =============================================================================

/// Report types exposed by the GPS provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    #[serde(rename = "consumos")]
    Consumos,
    #[serde(rename = "engineStatus")]
    EngineStatus,
    #[serde(rename = "estacionamientos")]
    Estacionamientos,
    #[serde(rename = "ignition")]
    Ignition,
    #[serde(rename = "lastPos")]
    LastPos,
    #[serde(rename = "odometros")]
    Odometros,
    #[serde(rename = "recorridos")]
    Recorridos,
    #[serde(rename = "sinMov")]
    SinMov,
    #[serde(rename = "speed")]
    Speed,
    #[serde(rename = "voltage")]
    Voltage,
}

impl ReportType {
    pub const ALL: [ReportType; 10] = [
        ReportType::Consumos,
        ReportType::EngineStatus,
        ReportType::Estacionamientos,
        ReportType::Ignition,
        ReportType::LastPos,
        ReportType::Odometros,
        ReportType::Recorridos,
        ReportType::SinMov,
        ReportType::Speed,
        ReportType::Voltage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Consumos => "consumos",
            ReportType::EngineStatus => "engineStatus",
            ReportType::Estacionamientos => "estacionamientos",
            ReportType::Ignition => "ignition",
            ReportType::LastPos => "lastPos",
            ReportType::Odometros => "odometros",
            ReportType::Recorridos => "recorridos",
            ReportType::SinMov => "sinMov",
            ReportType::Speed => "speed",
            ReportType::Voltage => "voltage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the provider is asked to select vehicles for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchType {
    #[serde(rename = "searchByDay")]
    ByDay,
    #[serde(rename = "searchByName")]
    ByName,
    #[serde(rename = "searchByTimeRange")]
    ByTimeRange,
    #[serde(rename = "searchByVIN")]
    ByVin,
}

/// Status of an ingestion operation or job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    Running,
    Success,
    PartialSuccess,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Pending => "pending",
            IngestionStatus::Running => "running",
            IngestionStatus::Success => "success",
            IngestionStatus::PartialSuccess => "partial_success",
            IngestionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IngestionStatus::Pending),
            "running" => Some(IngestionStatus::Running),
            "success" => Some(IngestionStatus::Success),
            "partial_success" => Some(IngestionStatus::PartialSuccess),
            "failed" => Some(IngestionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestionStatus::Success | IngestionStatus::PartialSuccess | IngestionStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    High,
    Medium,
    Low,
    NoData,
}

impl DataQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::High => "high",
            DataQuality::Medium => "medium",
            DataQuality::Low => "low",
            DataQuality::NoData => "no_data",
        }
    }
}

/// Binary on/off state reported for engine and ignition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    Off,
    On,
}

impl SwitchState {
    /// Parses the provider's "0"/"1" flags.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "0" => Some(SwitchState::Off),
            "1" => Some(SwitchState::On),
            _ => None,
        }
    }
}

pub type EngineStatus = SwitchState;
pub type IgnitionStatus = SwitchState;

/// What a canonical record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PositionUpdate,
    IgnitionChange,
    EngineStatusChange,
    SpeedViolation,
    ParkingEvent,
    OdometerUpdate,
    TripCompleted,
    VoltageAlert,
    NoMovementDetected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PositionUpdate => "position_update",
            EventType::IgnitionChange => "ignition_change",
            EventType::EngineStatusChange => "engine_status_change",
            EventType::SpeedViolation => "speed_violation",
            EventType::ParkingEvent => "parking_event",
            EventType::OdometerUpdate => "odometer_update",
            EventType::TripCompleted => "trip_completed",
            EventType::VoltageAlert => "voltage_alert",
            EventType::NoMovementDetected => "no_movement_detected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "position_update" => Some(EventType::PositionUpdate),
            "ignition_change" => Some(EventType::IgnitionChange),
            "engine_status_change" => Some(EventType::EngineStatusChange),
            "speed_violation" => Some(EventType::SpeedViolation),
            "parking_event" => Some(EventType::ParkingEvent),
            "odometer_update" => Some(EventType::OdometerUpdate),
            "trip_completed" => Some(EventType::TripCompleted),
            "voltage_alert" => Some(EventType::VoltageAlert),
            "no_movement_detected" => Some(EventType::NoMovementDetected),
            _ => None,
        }
    }
}

// =============================================================================
// Canonical record
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A numeric measurement with its unit, e.g. speed or odometer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: Decimal,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub count: u32,
    pub total_duration_seconds: Option<u64>,
    pub total_distance_km: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingEvent {
    pub duration_hours: Decimal,
    pub location: Option<GeoLocation>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionData {
    pub distance_km: Option<Decimal>,
    pub time_on_movement_seconds: Option<u64>,
    pub calculated_consumption: Option<Decimal>,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageReading {
    pub value: Decimal,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub is_healthy: bool,
}

/// How and when a record was ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionMetadata {
    pub provider_name: String,
    pub report_type: ReportType,
    pub ingestion_timestamp: DateTime<Utc>,
    pub status: IngestionStatus,
    pub quality: DataQuality,
    pub raw_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

/// Normalized, report-type-agnostic observation of one vehicle.
///
/// Built once by the normalizer and never mutated after it is handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    pub vin: String,
    /// The provider's own key for the vehicle (e.g. "1008").
    pub vehicle_name: Option<String>,
    pub location: Option<GeoLocation>,
    pub speed: Option<Reading>,
    pub odometer: Option<Reading>,
    pub engine_status: Option<EngineStatus>,
    pub ignition_status: Option<IgnitionStatus>,
    pub trips: Option<TripSummary>,
    pub parking_events: Option<Vec<ParkingEvent>>,
    pub consumption: Option<ConsumptionData>,
    pub voltage: Option<VoltageReading>,
    pub event_type: EventType,
    pub metadata: IngestionMetadata,
    /// Device time.
    pub recorded_at: DateTime<Utc>,
    /// Ingestion time.
    pub created_at: DateTime<Utc>,
}

impl VehicleTelemetry {
    /// A record with only the identifying fields set; callers fill in the payload.
    pub fn new(
        vin: impl Into<String>,
        event_type: EventType,
        metadata: IngestionMetadata,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let created_at = metadata.ingestion_timestamp;
        Self {
            vin: vin.into(),
            vehicle_name: None,
            location: None,
            speed: None,
            odometer: None,
            engine_status: None,
            ignition_status: None,
            trips: None,
            parking_events: None,
            consumption: None,
            voltage: None,
            event_type,
            metadata,
            recorded_at,
            created_at,
        }
    }
}

// =============================================================================
// Vehicles
// =============================================================================

/// A tracked vehicle in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vin: String,
    pub vehicle_name: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub license_plate: Option<String>,
    pub fleet_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(vin: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            vin: vin.into(),
            vehicle_name: None,
            make: None,
            model: None,
            year: None,
            license_plate: None,
            fleet_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
