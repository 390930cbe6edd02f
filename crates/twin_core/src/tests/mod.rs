use super::*;
use crate::test_fixtures::{base_plant, base_state, make_rng, sid, vid};

mod transaction;

// --- Shared test helpers ------------------------------------------------

const TOLERANCE: f64 = 1e-6;

fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < TOLERANCE
}

fn station<'a>(state: &'a TwinState, id: &str) -> &'a StationState {
    &state.stations[&sid(id)]
}

fn station_mut<'a>(state: &'a mut TwinState, id: &str) -> &'a mut StationState {
    state.stations.get_mut(&sid(id)).unwrap()
}

fn vehicle_mut<'a>(state: &'a mut TwinState, id: &str) -> &'a mut VehicleState {
    state.vehicles.get_mut(&vid(id)).unwrap()
}

fn vehicle_def<'a>(plant: &'a Plant, id: &str) -> &'a VehicleDef {
    plant
        .content
        .vehicles
        .iter()
        .find(|def| def.id == vid(id))
        .unwrap()
}

fn station_kind<'a>(plant: &'a Plant, id: &str) -> &'a StationKind {
    &plant
        .content
        .stations
        .iter()
        .find(|def| def.id == sid(id))
        .unwrap()
        .kind
}

fn load(vehicle: &str, requested: f64) -> TransactionRequest {
    TransactionRequest {
        vehicle_id: vid(vehicle),
        direction: Direction::Load,
        requested,
    }
}

fn unload(vehicle: &str, requested: f64) -> TransactionRequest {
    TransactionRequest {
        vehicle_id: vid(vehicle),
        direction: Direction::Unload,
        requested,
    }
}

fn assert_conserved(state: &TwinState, plant: &Plant) {
    let error = conservation_error(state, plant);
    assert!(
        error.abs() < TOLERANCE,
        "material drifted from ledger by {error}"
    );
}

fn assert_levels_in_bounds(state: &TwinState, plant: &Plant) {
    let capacity = plant.capacity();
    for station in state.stations.values() {
        for level in [
            station.input_level,
            station.output_level,
            station.aux_level().unwrap_or(0.0),
        ] {
            assert!(
                (0.0..=capacity).contains(&level),
                "{} level {level} out of bounds",
                station.id
            );
        }
    }
}
