//! Material accounting across the system boundary.

use crate::{Plant, TwinState};

/// Material currently held in station buffers and vehicle cargo.
///
/// Pump outputs are throughput counters, not stock, and are left out.
pub fn material_in_system(state: &TwinState, plant: &Plant) -> f64 {
    let stations: f64 = state
        .stations
        .values()
        .filter(|station| !plant.is_pump(&station.id))
        .map(|station| {
            station.input_level + station.output_level + station.aux_level().unwrap_or(0.0)
        })
        .sum();
    let cargo: f64 = state.vehicles.values().map(|v| v.cargo_weight).sum();
    stations + cargo
}

/// Difference between held material and what the ledger says should be held.
pub fn conservation_error(state: &TwinState, plant: &Plant) -> f64 {
    material_in_system(state, plant) - state.ledger.expected_total()
}
