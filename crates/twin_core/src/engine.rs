use rand::Rng;

use crate::audit::AuditLog;
use crate::ledger::material_in_system;
use crate::station::tick_stations;
use crate::transfer::run_headless_transfers;
use crate::vehicle::{drive_vehicles, new_vehicle};
use crate::{
    clamp_level, AuxBuffer, Counters, Event, EventEnvelope, EventLevel, MassLedger, MetaState,
    Plant, SimulationStats, StationOutcome, StationState, TransportStrategy, TwinState,
};

/// Slack, relative to `tick_seconds`, so that frames summing to exactly one
/// tick fire it despite rounding.
const ACCUMULATOR_EPSILON: f64 = 1e-9;

/// Advance the simulation by one frame of `dt` time units.
///
/// Order of operations:
/// 1. Accumulate `dt`; for each whole `tick_seconds` accumulated, advance all
///    stations in layout order, then (headless only) run the fixed transfer
///    routes, then update statistics.
/// 2. Animated only: advance every vehicle by `dt`, resolving transactions.
///
/// Does nothing while the simulation is paused. Returns all events produced.
pub fn tick(
    state: &mut TwinState,
    plant: &Plant,
    strategy: TransportStrategy,
    dt: f64,
    rng: &mut impl Rng,
    event_level: EventLevel,
) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    if !state.meta.running {
        return events;
    }

    let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
    state.meta.frame += 1;
    state.meta.sim_time += dt;
    state.meta.clock_accumulator += dt;

    let tick_seconds = plant.content.constants.tick_seconds;
    let slack = tick_seconds * ACCUMULATOR_EPSILON;
    while state.meta.clock_accumulator + slack >= tick_seconds {
        state.meta.clock_accumulator = (state.meta.clock_accumulator - tick_seconds).max(0.0);
        run_station_tick(state, plant, strategy, event_level, &mut events);
    }

    if strategy == TransportStrategy::Animated {
        drive_vehicles(state, plant, dt, rng, &mut events);
    }

    events
}

fn run_station_tick(
    state: &mut TwinState,
    plant: &Plant,
    strategy: TransportStrategy,
    event_level: EventLevel,
    events: &mut Vec<EventEnvelope>,
) {
    let processed = tick_stations(state, plant, event_level, events);
    if strategy == TransportStrategy::Headless {
        run_headless_transfers(state, plant, events);
    }

    state.stats.total_processed += processed;
    state.stats.uptime_ticks += 1;
    state.stats.efficiency = efficiency(&state.stats, plant.nameplate_rate());
}

/// Percent of nameplate conversion capacity used since start, in `[0, 100]`.
pub fn efficiency(stats: &SimulationStats, nameplate_rate: f64) -> f64 {
    let possible = stats.uptime_ticks as f64 * nameplate_rate;
    if possible <= 0.0 {
        return 0.0;
    }
    (100.0 * stats.total_processed / possible).clamp(0.0, 100.0)
}

/// Start or stop the clock. Returns an event only when the flag changes.
pub fn set_running(state: &mut TwinState, running: bool) -> Option<EventEnvelope> {
    if state.meta.running == running {
        return None;
    }
    state.meta.running = running;
    let event = if running {
        Event::SimulationResumed
    } else {
        Event::SimulationPaused
    };
    tracing::info!(running, tick = state.stats.uptime_ticks, "simulation clock toggled");
    Some(crate::emit(
        &mut state.counters,
        state.stats.uptime_ticks,
        event,
    ))
}

/// Build a fresh running state from validated content.
///
/// Seed levels are clamped to capacity and the ledger baseline is the
/// material held at start.
pub fn initial_state(plant: &Plant, seed: u64, rng: &mut impl Rng) -> TwinState {
    let content = &plant.content;
    let capacity = plant.capacity();

    let stations = content
        .stations
        .iter()
        .map(|def| {
            let aux = def.initial.aux_level.map(|level| AuxBuffer {
                name: def.aux_name.clone().unwrap_or_default(),
                level: clamp_level(level, capacity),
            });
            let station = StationState {
                id: def.id.clone(),
                input_level: clamp_level(def.initial.input_level, capacity),
                output_level: clamp_level(def.initial.output_level, capacity),
                process_rate: def.process_rate,
                aux,
                last_outcome: StationOutcome::Idle,
            };
            (def.id.clone(), station)
        })
        .collect();

    let vehicles = content
        .vehicles
        .iter()
        .map(|def| (def.id.clone(), new_vehicle(def, &content.constants, rng)))
        .collect();

    let mut state = TwinState {
        meta: MetaState {
            frame: 0,
            seed,
            schema_version: 1,
            content_version: content.content_version.clone(),
            running: true,
            sim_time: 0.0,
            clock_accumulator: 0.0,
        },
        stations,
        vehicles,
        stats: SimulationStats::default(),
        ledger: MassLedger::default(),
        audit: AuditLog::new(content.constants.audit_log_capacity),
        counters: Counters {
            next_event_id: 0,
            next_transaction_id: 0,
        },
    };
    state.ledger = MassLedger::with_baseline(material_in_system(&state, plant));
    state
}
