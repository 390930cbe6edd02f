//! Plant content loading and initial state shared between twin_cli and twin_daemon.

use std::path::Path;

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use twin_core::{Constants, Plant, PlantContent, StationDef, TransferRouteDef, TwinState, VehicleDef};

#[derive(Deserialize)]
struct StationsFile {
    content_version: String,
    stations: Vec<StationDef>,
}

#[derive(Deserialize)]
struct VehiclesFile {
    vehicles: Vec<VehicleDef>,
}

#[derive(Deserialize)]
struct TransferRoutesFile {
    routes: Vec<TransferRouteDef>,
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let text = std::fs::read_to_string(dir.join(name)).with_context(|| format!("reading {name}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {name}"))
}

/// Load and validate the plant layout from `content_dir`.
pub fn load_content(content_dir: &str) -> Result<Plant> {
    let dir = Path::new(content_dir);
    let constants: Constants = read_json(dir, "constants.json")?;
    let stations: StationsFile = read_json(dir, "stations.json")?;
    let vehicles: VehiclesFile = read_json(dir, "vehicles.json")?;
    let routes: TransferRoutesFile = read_json(dir, "transfer_routes.json")?;

    let content = PlantContent {
        content_version: stations.content_version,
        stations: stations.stations,
        vehicles: vehicles.vehicles,
        transfer_routes: routes.routes,
        constants,
    };
    let plant = Plant::new(content)
        .with_context(|| format!("validating plant layout in {content_dir}"))?;
    tracing::info!(
        content_version = %plant.content.content_version,
        stations = plant.content.stations.len(),
        vehicles = plant.content.vehicles.len(),
        "plant content loaded"
    );
    Ok(plant)
}

pub fn make_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

pub fn build_initial_state(plant: &Plant, seed: u64, rng: &mut impl Rng) -> TwinState {
    let state = twin_core::initial_state(plant, seed, rng);
    tracing::debug!(
        seed,
        baseline = state.ledger.baseline,
        "initial state built"
    );
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_core::test_fixtures::base_content;

    fn write_content(dir: &Path, content: &PlantContent) {
        let write = |name: &str, value: serde_json::Value| {
            std::fs::write(dir.join(name), serde_json::to_string_pretty(&value).unwrap()).unwrap();
        };
        write(
            "constants.json",
            serde_json::to_value(&content.constants).unwrap(),
        );
        write(
            "stations.json",
            serde_json::json!({
                "content_version": content.content_version,
                "stations": content.stations,
            }),
        );
        write(
            "vehicles.json",
            serde_json::json!({ "vehicles": content.vehicles }),
        );
        write(
            "transfer_routes.json",
            serde_json::json!({ "routes": content.transfer_routes }),
        );
    }

    #[test]
    fn test_round_trips_written_content() {
        let dir = tempfile::tempdir().unwrap();
        write_content(dir.path(), &base_content());

        let plant = load_content(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(plant.content.stations.len(), 5);
        assert_eq!(plant.routes.len(), 5);
    }

    #[test]
    fn test_missing_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write_content(dir.path(), &base_content());
        std::fs::remove_file(dir.path().join("vehicles.json")).unwrap();

        let err = load_content(dir.path().to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("vehicles.json"));
    }

    #[test]
    fn test_malformed_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write_content(dir.path(), &base_content());
        std::fs::write(dir.path().join("stations.json"), "{ not json").unwrap();

        let err = load_content(dir.path().to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing stations.json"));
    }

    #[test]
    fn test_layout_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = base_content();
        content.vehicles[1].route.source = Some(twin_core::StationId("D404".to_string()));
        write_content(dir.path(), &content);

        let err = load_content(dir.path().to_str().unwrap()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("validating plant layout"));
        assert!(message.contains("D404"));
    }

    #[test]
    fn test_initial_state_is_seed_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_content(dir.path(), &base_content());
        let plant = load_content(dir.path().to_str().unwrap()).unwrap();

        let a = build_initial_state(&plant, 7, &mut make_rng(7));
        let b = build_initial_state(&plant, 7, &mut make_rng(7));
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
        assert_eq!(a.meta.seed, 7);
        assert!(a.meta.running);
    }
}
