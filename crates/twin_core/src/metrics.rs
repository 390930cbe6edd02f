//! Snapshot metrics computed from `TwinState`.
//!
//! A single `compute_metrics(&TwinState, &Plant) -> MetricsSnapshot` function
//! samples the current state for time-series analysis. No state mutation, no IO.

use serde::Serialize;
use std::io::Write;

use crate::ledger::material_in_system;
use crate::{MotionState, Plant, StationKind, StationOutcome, TwinState};

/// Current schema version — bump when fields are added/removed/reordered.
const METRICS_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tick: u64,
    pub metrics_version: u32,

    // Buffers (converting stations only)
    pub total_input: f64,
    pub total_output: f64,
    pub total_aux: f64,
    pub min_aux_level: f64,
    pub total_cargo: f64,

    // Conservation
    pub material_in_system: f64,
    pub conservation_error: f64,
    pub source_injected: f64,
    pub sink_removed: f64,

    // Stations
    pub stations_processing: u32,
    pub stations_starved: u32,
    pub stations_backpressured: u32,

    // Fleet
    pub fleet_total: u32,
    pub fleet_loading: u32,
    pub fleet_moving: u32,
    pub fleet_unloading: u32,
    pub fleet_returning: u32,

    // Throughput
    pub total_transported: f64,
    pub total_processed: f64,
    pub cycle_count: u64,
    pub efficiency: f64,
    pub audit_entries: u32,
}

#[allow(clippy::cast_possible_truncation)]
pub fn compute_metrics(state: &TwinState, plant: &Plant) -> MetricsSnapshot {
    let mut total_input = 0.0;
    let mut total_output = 0.0;
    let mut total_aux = 0.0;
    let mut min_aux_level: Option<f64> = None;
    let mut stations_processing = 0_u32;
    let mut stations_starved = 0_u32;
    let mut stations_backpressured = 0_u32;

    // --- Stations ---
    for def in &plant.content.stations {
        let Some(station) = state.stations.get(&def.id) else {
            continue;
        };
        if matches!(def.kind, StationKind::Pump { .. }) {
            continue;
        }
        total_input += station.input_level;
        total_output += station.output_level;
        if let Some(level) = station.aux_level() {
            total_aux += level;
            min_aux_level = Some(min_aux_level.map_or(level, |m: f64| m.min(level)));
        }
        match station.last_outcome {
            StationOutcome::Processed => stations_processing += 1,
            StationOutcome::Starved => stations_starved += 1,
            StationOutcome::Backpressured => stations_backpressured += 1,
            StationOutcome::Idle | StationOutcome::Pumping => {}
        }
    }

    // --- Fleet ---
    let mut fleet_loading = 0_u32;
    let mut fleet_moving = 0_u32;
    let mut fleet_unloading = 0_u32;
    let mut fleet_returning = 0_u32;
    let mut total_cargo = 0.0;
    for vehicle in state.vehicles.values() {
        total_cargo += vehicle.cargo_weight;
        match vehicle.motion {
            MotionState::Loading => fleet_loading += 1,
            MotionState::Moving => fleet_moving += 1,
            MotionState::Unloading => fleet_unloading += 1,
            MotionState::Returning => fleet_returning += 1,
        }
    }

    let held = material_in_system(state, plant);

    MetricsSnapshot {
        tick: state.stats.uptime_ticks,
        metrics_version: METRICS_VERSION,
        total_input,
        total_output,
        total_aux,
        min_aux_level: min_aux_level.unwrap_or(0.0),
        total_cargo,
        material_in_system: held,
        conservation_error: held - state.ledger.expected_total(),
        source_injected: state.ledger.source_injected,
        sink_removed: state.ledger.sink_removed,
        stations_processing,
        stations_starved,
        stations_backpressured,
        fleet_total: state.vehicles.len() as u32,
        fleet_loading,
        fleet_moving,
        fleet_unloading,
        fleet_returning,
        total_transported: state.stats.total_transported,
        total_processed: state.stats.total_processed,
        cycle_count: state.stats.cycle_count,
        efficiency: state.stats.efficiency,
        audit_entries: state.audit.len() as u32,
    }
}

/// Write the CSV header row for metrics.
pub fn write_metrics_header(writer: &mut impl std::io::Write) -> std::io::Result<()> {
    writeln!(
        writer,
        "tick,metrics_version,\
         total_input,total_output,total_aux,min_aux_level,total_cargo,\
         material_in_system,conservation_error,source_injected,sink_removed,\
         stations_processing,stations_starved,stations_backpressured,\
         fleet_total,fleet_loading,fleet_moving,fleet_unloading,fleet_returning,\
         total_transported,total_processed,cycle_count,efficiency,audit_entries"
    )
}

/// Append a single metrics snapshot as a CSV row.
pub fn append_metrics_row(
    writer: &mut impl std::io::Write,
    snapshot: &MetricsSnapshot,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        snapshot.tick,
        snapshot.metrics_version,
        snapshot.total_input,
        snapshot.total_output,
        snapshot.total_aux,
        snapshot.min_aux_level,
        snapshot.total_cargo,
        snapshot.material_in_system,
        snapshot.conservation_error,
        snapshot.source_injected,
        snapshot.sink_removed,
        snapshot.stations_processing,
        snapshot.stations_starved,
        snapshot.stations_backpressured,
        snapshot.fleet_total,
        snapshot.fleet_loading,
        snapshot.fleet_moving,
        snapshot.fleet_unloading,
        snapshot.fleet_returning,
        snapshot.total_transported,
        snapshot.total_processed,
        snapshot.cycle_count,
        snapshot.efficiency,
        snapshot.audit_entries,
    )
}

/// Write a collection of snapshots to a CSV file.
pub fn write_metrics_csv(path: &str, snapshots: &[MetricsSnapshot]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_metrics_header(&mut file)?;
    for snapshot in snapshots {
        append_metrics_row(&mut file, snapshot)?;
    }
    Ok(())
}

/// Maximum data rows per CSV file before rotating to a new file.
const MAX_ROWS_PER_FILE: usize = 50_000;

/// Rotating metrics CSV writer. Splits into numbered files
/// (`metrics_000.csv`, `metrics_001.csv`, ...) every [`MAX_ROWS_PER_FILE`] rows.
pub struct MetricsFileWriter {
    run_dir: std::path::PathBuf,
    file_index: u32,
    rows_in_current_file: usize,
    writer: std::io::BufWriter<std::fs::File>,
}

impl MetricsFileWriter {
    pub fn new(run_dir: std::path::PathBuf) -> std::io::Result<Self> {
        let writer = open_csv_file(&run_dir, 0)?;
        Ok(Self {
            run_dir,
            file_index: 0,
            rows_in_current_file: 0,
            writer,
        })
    }

    /// Append one row, rotating first if the current file is full.
    pub fn write_row(&mut self, snapshot: &MetricsSnapshot) -> std::io::Result<()> {
        if self.rows_in_current_file >= MAX_ROWS_PER_FILE {
            self.writer.flush()?;
            self.file_index += 1;
            self.writer = open_csv_file(&self.run_dir, self.file_index)?;
            self.rows_in_current_file = 0;
        }
        append_metrics_row(&mut self.writer, snapshot)?;
        self.rows_in_current_file += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn open_csv_file(
    run_dir: &std::path::Path,
    index: u32,
) -> std::io::Result<std::io::BufWriter<std::fs::File>> {
    let path = run_dir.join(format!("metrics_{index:03}.csv"));
    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_metrics_header(&mut writer)?;
    Ok(writer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
