use super::VehicleDirectory;
use crate::provider::mock_data::MOCK_FLEET;
use crate::telemetry::Vehicle;
use anyhow::Result;
use tracing::info;

/// Register the mock provider's demo fleet. Existing vehicles are left untouched.
///
/// Returns the number of vehicles added.
pub fn seed_mock_fleet(directory: &dyn VehicleDirectory) -> Result<usize> {
    let mut added = 0;
    for (vehicle_key, vin) in MOCK_FLEET {
        if directory.find_vehicle(vin)?.is_some() {
            continue;
        }
        let mut vehicle = Vehicle::new(vin);
        vehicle.vehicle_name = Some(vehicle_key.to_string());
        vehicle.fleet_id = Some("mock".to_string());
        directory.upsert_vehicle(&vehicle)?;
        added += 1;
    }
    info!("Seeded {} mock vehicles", added);
    Ok(added)
}
