//! Type definitions for `twin_core`.
//!
//! All public state, content, event and ID types used by the simulation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::audit::AuditLog;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(StationId);
string_id!(VehicleId);
string_id!(EventId);

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Normal,
    Debug,
}

/// Which mechanism moves material between stations.
///
/// Chosen by whoever drives the clock and passed into every `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStrategy {
    /// Vehicles run their motion state machines and transact on their own.
    Animated,
    /// Vehicles hold; fixed routes transfer material at a fixed rate.
    Headless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Loading,
    Moving,
    Unloading,
    Returning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Load,
    Unload,
}

/// Result of the most recent processing tick of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationOutcome {
    #[default]
    Idle,
    Processed,
    /// Input (or auxiliary reagent) insufficient.
    Starved,
    /// Output buffer full.
    Backpressured,
    Pumping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwinState {
    pub meta: MetaState,
    pub stations: HashMap<StationId, StationState>,
    pub vehicles: HashMap<VehicleId, VehicleState>,
    pub stats: SimulationStats,
    pub ledger: MassLedger,
    pub audit: AuditLog,
    pub counters: Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaState {
    /// Number of `tick` calls that ran while the simulation was running.
    pub frame: u64,
    pub seed: u64,
    pub schema_version: u32,
    pub content_version: String,
    pub running: bool,
    /// Simulated time units elapsed while running.
    pub sim_time: f64,
    /// Time carried toward the next station tick.
    pub clock_accumulator: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
    pub next_transaction_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationState {
    pub id: StationId,
    pub input_level: f64,
    pub output_level: f64,
    pub process_rate: f64,
    pub aux: Option<AuxBuffer>,
    pub last_outcome: StationOutcome,
}

impl StationState {
    pub fn aux_level(&self) -> Option<f64> {
        self.aux.as_ref().map(|aux| aux.level)
    }
}

/// Secondary reagent buffer (e.g. process water) on dual-input stations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxBuffer {
    pub name: String,
    pub level: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    pub id: VehicleId,
    pub motion: MotionState,
    pub cargo_weight: f64,
    /// Weight requested at the next loading event, drawn when loading begins.
    pub cargo_target: f64,
    pub cargo_temperature: f64,
    pub cargo_ph: f64,
    pub dwell_remaining: f64,
    /// Index of the path segment currently being traversed.
    pub segment: usize,
    /// Progress along `segment`, 0.0 at its start waypoint and 1.0 at its end.
    pub progress: f64,
    pub position: [f64; 3],
}

/// Aggregate counters. Everything but `efficiency` only grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub total_transported: f64,
    pub total_processed: f64,
    pub uptime_ticks: u64,
    pub cycle_count: u64,
    /// Percent of nameplate conversion capacity actually used.
    pub efficiency: f64,
}

/// Running account of material crossing the system boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MassLedger {
    /// Material in the system when the session started.
    pub baseline: f64,
    pub source_injected: f64,
    pub sink_removed: f64,
    pub reagent_injected: f64,
    pub reagent_consumed: f64,
    /// Net change applied by telemetry overrides.
    pub external_adjustment: f64,
}

impl MassLedger {
    pub fn with_baseline(baseline: f64) -> Self {
        Self {
            baseline,
            ..Self::default()
        }
    }

    /// Material that should be in the system given every boundary crossing so far.
    pub fn expected_total(&self) -> f64 {
        self.baseline + self.source_injected - self.sink_removed + self.reagent_injected
            - self.reagent_consumed
            + self.external_adjustment
    }
}

/// One vehicle load or unload, as admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub tick: u64,
    pub sim_time: f64,
    pub vehicle_id: VehicleId,
    pub direction: Direction,
    /// `None` when the counterpart is the exogenous source or the terminal sink.
    pub station_id: Option<StationId>,
    pub requested: f64,
    pub admitted: f64,
    pub station_before: f64,
    pub station_after: f64,
    pub vehicle_before: f64,
    pub vehicle_after: f64,
}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub tick: u64,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StationProcessed {
        station_id: StationId,
        amount: f64,
    },
    /// Only emitted at `EventLevel::Debug`.
    StationStalled {
        station_id: StationId,
        outcome: StationOutcome,
    },
    VehicleStateChanged {
        vehicle_id: VehicleId,
        from: MotionState,
        to: MotionState,
    },
    VehicleLoaded {
        vehicle_id: VehicleId,
        station_id: Option<StationId>,
        requested: f64,
        admitted: f64,
    },
    VehicleUnloaded {
        vehicle_id: VehicleId,
        station_id: Option<StationId>,
        requested: f64,
        admitted: f64,
        residual: f64,
    },
    HeadlessTransfer {
        from: StationId,
        to: StationId,
        amount: f64,
    },
    TelemetryApplied {
        target: String,
    },
    SimulationPaused,
    SimulationResumed,
    AlertRaised {
        alert_id: String,
        severity: AlertSeverity,
        message: String,
        suggested_action: String,
    },
    AlertCleared {
        alert_id: String,
    },
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantContent {
    pub content_version: String,
    /// Processing order within a tick follows this order.
    pub stations: Vec<StationDef>,
    pub vehicles: Vec<VehicleDef>,
    pub transfer_routes: Vec<TransferRouteDef>,
    pub constants: Constants,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationDef {
    pub id: StationId,
    pub name: String,
    pub input_name: String,
    pub output_name: String,
    #[serde(default)]
    pub aux_name: Option<String>,
    pub process_rate: f64,
    pub kind: StationKind,
    pub initial: StationSeed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationKind {
    /// Moves `process_rate` per tick from input to output.
    Converter,
    /// Converts primary input only while an auxiliary reagent is available,
    /// consuming `aux_ratio` units of reagent per unit converted.
    DualInput { aux_ratio: f64, aux_threshold: f64 },
    /// Counts throughput on its own output and feeds the aux buffer of `feeds`.
    Pump { feeds: StationId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSeed {
    pub input_level: f64,
    pub output_level: f64,
    #[serde(default)]
    pub aux_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleDef {
    pub id: VehicleId,
    pub cargo_type: String,
    pub route: Route,
    /// Ordered waypoints from origin to destination.
    pub path: Vec<[f64; 3]>,
    /// Distance units per time unit.
    pub speed: f64,
    pub base_cargo: CargoStats,
}

/// Where a vehicle loads and unloads. A missing end is the system boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub source: Option<StationId>,
    #[serde(default)]
    pub destination: Option<StationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CargoStats {
    pub temperature: f64,
    pub ph: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRouteDef {
    pub from: StationId,
    pub to: StationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constants {
    /// Ceiling of every station buffer.
    pub station_capacity: f64,
    /// Headless transfer amount per route per tick.
    pub transfer_rate: f64,
    /// Time units a vehicle spends loading or unloading.
    pub dwell_time: f64,
    /// Time units per station tick.
    pub tick_seconds: f64,
    pub audit_log_capacity: usize,
    pub weight_jitter: f64,
    pub temperature_jitter: f64,
    pub ph_jitter: f64,
}
