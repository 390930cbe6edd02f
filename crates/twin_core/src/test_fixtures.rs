//! Shared test fixtures for `twin_core` and downstream crates.
//!
//! `base_content()` reproduces the default five-station line with its five
//! AGVs. `base_plant()` validates it and `base_state()` seeds a running state.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    initial_state, CargoStats, Constants, Plant, PlantContent, Route, StationDef, StationId,
    StationKind, StationSeed, TransferRouteDef, TwinState, VehicleDef, VehicleId,
};

pub const TEST_SEED: u64 = 42;

pub fn sid(id: &str) -> StationId {
    StationId(id.to_string())
}

pub fn vid(id: &str) -> VehicleId {
    VehicleId(id.to_string())
}

pub fn base_constants() -> Constants {
    Constants {
        station_capacity: 2000.0,
        transfer_rate: 50.0,
        dwell_time: 2.0,
        tick_seconds: 1.0,
        audit_log_capacity: 100,
        weight_jitter: 5.0,
        temperature_jitter: 1.0,
        ph_jitter: 0.1,
    }
}

fn station(
    id: &str,
    name: &str,
    (input_name, output_name): (&str, &str),
    process_rate: f64,
    kind: StationKind,
    (input_level, output_level): (f64, f64),
) -> StationDef {
    StationDef {
        id: sid(id),
        name: name.to_string(),
        input_name: input_name.to_string(),
        output_name: output_name.to_string(),
        aux_name: None,
        process_rate,
        kind,
        initial: StationSeed {
            input_level,
            output_level,
            aux_level: None,
        },
    }
}

fn vehicle(
    id: &str,
    cargo_type: &str,
    (source, destination): (Option<&str>, Option<&str>),
    path: Vec<[f64; 3]>,
    (temperature, ph, weight): (f64, f64, f64),
) -> VehicleDef {
    VehicleDef {
        id: vid(id),
        cargo_type: cargo_type.to_string(),
        route: Route {
            source: source.map(sid),
            destination: destination.map(sid),
        },
        path,
        speed: 2.0,
        base_cargo: CargoStats {
            temperature,
            ph,
            weight,
        },
    }
}

pub fn base_content() -> PlantContent {
    let mut tower = station(
        "DistillationTower",
        "Distillation tower",
        ("steamed grain", "raw spirit"),
        35.0,
        StationKind::DualInput {
            aux_ratio: 0.5,
            aux_threshold: 10.0,
        },
        (600.0, 100.0),
    );
    tower.aux_name = Some("pressurized hot water".to_string());
    tower.initial.aux_level = Some(500.0);

    PlantContent {
        content_version: "test".to_string(),
        stations: vec![
            station(
                "D001",
                "Mixer",
                ("fermented grains", "mixed grains"),
                30.0,
                StationKind::Converter,
                (500.0, 200.0),
            ),
            station(
                "D002",
                "Steaming robot",
                ("mixed grains", "steamed grain"),
                40.0,
                StationKind::Converter,
                (400.0, 300.0),
            ),
            station(
                "D003",
                "Hot water pump",
                ("water", "pressurized hot water"),
                50.0,
                StationKind::Pump {
                    feeds: sid("DistillationTower"),
                },
                (50.0, 0.0),
            ),
            tower,
            station(
                "D004",
                "Cooler",
                ("raw spirit", "cooled spirit"),
                45.0,
                StationKind::Converter,
                (300.0, 400.0),
            ),
        ],
        vehicles: vec![
            vehicle(
                "AGV-01",
                "fermented",
                (None, Some("D001")),
                vec![
                    [-15.0, 0.0, -30.0],
                    [-30.0, 0.0, -30.0],
                    [-30.0, 0.0, -20.0],
                    [-25.0, 0.0, -20.0],
                ],
                (32.5, 3.8, 800.0),
            ),
            vehicle(
                "AGV-02",
                "mixed",
                (Some("D001"), Some("D002")),
                vec![
                    [-25.0, 0.0, -15.0],
                    [-30.0, 0.0, -15.0],
                    [-30.0, 0.0, 0.0],
                    [-25.0, 0.0, 0.0],
                ],
                (26.0, 4.2, 850.0),
            ),
            vehicle(
                "AGV-03",
                "mixed",
                (Some("D002"), Some("DistillationTower")),
                vec![
                    [-25.0, 0.0, 0.0],
                    [-15.0, 0.0, 0.0],
                    [-10.0, 0.0, 0.0],
                    [0.0, 0.0, 0.0],
                ],
                (26.0, 4.2, 850.0),
            ),
            vehicle(
                "AGV-04",
                "distilled",
                (Some("DistillationTower"), Some("D004")),
                vec![
                    [0.0, 0.0, 0.0],
                    [10.0, 0.0, 0.0],
                    [15.0, 0.0, 0.0],
                    [25.0, 0.0, 0.0],
                ],
                (85.0, 3.5, 700.0),
            ),
            vehicle(
                "AGV-05",
                "cooled",
                (Some("D004"), None),
                vec![
                    [25.0, 0.0, 0.0],
                    [35.0, 0.0, 0.0],
                    [35.0, 0.0, -30.0],
                    [15.0, 0.0, -30.0],
                ],
                (28.0, 3.6, 750.0),
            ),
        ],
        transfer_routes: vec![
            TransferRouteDef {
                from: sid("D001"),
                to: sid("D002"),
            },
            TransferRouteDef {
                from: sid("D002"),
                to: sid("DistillationTower"),
            },
            TransferRouteDef {
                from: sid("DistillationTower"),
                to: sid("D004"),
            },
        ],
        constants: base_constants(),
    }
}

pub fn base_plant() -> Plant {
    Plant::new(base_content()).expect("default line must validate")
}

pub fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(TEST_SEED)
}

/// Running state seeded from `plant` with [`TEST_SEED`].
pub fn base_state(plant: &Plant) -> TwinState {
    initial_state(plant, TEST_SEED, &mut make_rng())
}
