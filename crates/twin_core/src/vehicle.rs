//! Vehicle motion state machine.
//!
//! Each vehicle cycles `Loading -> Moving -> Unloading -> Returning -> Loading`
//! along a fixed waypoint path. Dwell expiry in `Loading`/`Unloading` produces
//! a [`TransactionRequest`]; the driver resolves it and hands the admitted
//! amount back through [`complete_transaction`], which performs the
//! transition.

use rand::Rng;

use crate::transaction::{request_transaction, TransactionRequest};
use crate::{
    Constants, Direction, Event, EventEnvelope, MotionState, Plant, TwinState, VehicleDef,
    VehicleState,
};

/// Build a vehicle parked at its origin, about to load.
pub fn new_vehicle(def: &VehicleDef, constants: &Constants, rng: &mut impl Rng) -> VehicleState {
    let mut vehicle = VehicleState {
        id: def.id.clone(),
        motion: MotionState::Loading,
        cargo_weight: 0.0,
        cargo_target: def.base_cargo.weight,
        cargo_temperature: def.base_cargo.temperature,
        cargo_ph: def.base_cargo.ph,
        dwell_remaining: constants.dwell_time,
        segment: 0,
        progress: 0.0,
        position: def.path.first().copied().unwrap_or_default(),
    };
    enter_loading(&mut vehicle, def, constants, rng);
    vehicle
}

fn jitter(rng: &mut impl Rng, band: f64) -> f64 {
    if band > 0.0 {
        rng.gen_range(-band..band)
    } else {
        0.0
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Park at the origin and draw fresh cargo telemetry for the next load.
fn enter_loading(
    vehicle: &mut VehicleState,
    def: &VehicleDef,
    constants: &Constants,
    rng: &mut impl Rng,
) {
    let base = &def.base_cargo;
    vehicle.motion = MotionState::Loading;
    vehicle.dwell_remaining = constants.dwell_time;
    vehicle.segment = 0;
    vehicle.progress = 0.0;
    if let Some(origin) = def.path.first() {
        vehicle.position = *origin;
    }
    vehicle.cargo_target = (base.weight + jitter(rng, constants.weight_jitter))
        .floor()
        .max(0.0);
    vehicle.cargo_temperature =
        round_tenth(base.temperature + jitter(rng, constants.temperature_jitter));
    vehicle.cargo_ph = round_tenth(base.ph + jitter(rng, constants.ph_jitter));
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

fn lerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn update_position(vehicle: &mut VehicleState, path: &[[f64; 3]]) {
    let seg = vehicle.segment.min(path.len() - 2);
    vehicle.position = lerp(path[seg], path[seg + 1], vehicle.progress);
}

/// Travel toward the last waypoint. Returns true on arrival.
fn travel_forward(vehicle: &mut VehicleState, path: &[[f64; 3]], speed: f64, dt: f64) -> bool {
    let last_segment = path.len() - 2;
    let mut remaining = speed * dt;
    loop {
        let seg = vehicle.segment.min(last_segment);
        let length = distance(path[seg], path[seg + 1]);
        let left_in_segment = (1.0 - vehicle.progress) * length;
        if length > f64::EPSILON && remaining < left_in_segment {
            vehicle.progress += remaining / length;
            update_position(vehicle, path);
            return false;
        }
        remaining -= left_in_segment;
        if seg == last_segment {
            vehicle.segment = last_segment;
            vehicle.progress = 1.0;
            update_position(vehicle, path);
            return true;
        }
        vehicle.segment = seg + 1;
        vehicle.progress = 0.0;
    }
}

/// Retrace the path toward the first waypoint. Returns true on arrival.
fn travel_backward(vehicle: &mut VehicleState, path: &[[f64; 3]], speed: f64, dt: f64) -> bool {
    let mut remaining = speed * dt;
    loop {
        let seg = vehicle.segment.min(path.len() - 2);
        let length = distance(path[seg], path[seg + 1]);
        let left_in_segment = vehicle.progress * length;
        if length > f64::EPSILON && remaining < left_in_segment {
            vehicle.progress -= remaining / length;
            update_position(vehicle, path);
            return false;
        }
        remaining -= left_in_segment;
        if seg == 0 {
            vehicle.segment = 0;
            vehicle.progress = 0.0;
            update_position(vehicle, path);
            return true;
        }
        vehicle.segment = seg - 1;
        vehicle.progress = 1.0;
    }
}

/// Advance one vehicle by `dt` time units.
///
/// Returns a request when a dwell expires; the vehicle stays in its dwell
/// state until [`complete_transaction`] is called with the admitted amount.
pub fn advance_motion(
    vehicle: &mut VehicleState,
    def: &VehicleDef,
    dt: f64,
    constants: &Constants,
    rng: &mut impl Rng,
) -> Option<TransactionRequest> {
    if def.path.len() < 2 {
        return None;
    }

    match vehicle.motion {
        MotionState::Loading | MotionState::Unloading => {
            vehicle.dwell_remaining -= dt;
            if vehicle.dwell_remaining > 0.0 {
                return None;
            }
            let (direction, requested) = if vehicle.motion == MotionState::Loading {
                // Residual cargo from a partial unload rides along.
                (
                    Direction::Load,
                    (vehicle.cargo_target - vehicle.cargo_weight).max(0.0),
                )
            } else {
                (Direction::Unload, vehicle.cargo_weight)
            };
            Some(TransactionRequest {
                vehicle_id: vehicle.id.clone(),
                direction,
                requested,
            })
        }
        MotionState::Moving => {
            if travel_forward(vehicle, &def.path, def.speed, dt) {
                vehicle.motion = MotionState::Unloading;
                vehicle.dwell_remaining = constants.dwell_time;
            }
            None
        }
        MotionState::Returning => {
            if travel_backward(vehicle, &def.path, def.speed, dt) {
                enter_loading(vehicle, def, constants, rng);
            }
            None
        }
    }
}

/// Adopt the admitted amount and leave the dwell state.
pub fn complete_transaction(
    vehicle: &mut VehicleState,
    def: &VehicleDef,
    direction: Direction,
    admitted: f64,
) {
    match direction {
        Direction::Load => {
            vehicle.cargo_weight += admitted;
            vehicle.motion = MotionState::Moving;
            vehicle.segment = 0;
            vehicle.progress = 0.0;
            if let Some(origin) = def.path.first() {
                vehicle.position = *origin;
            }
        }
        Direction::Unload => {
            vehicle.cargo_weight = (vehicle.cargo_weight - admitted).max(0.0);
            vehicle.motion = MotionState::Returning;
            vehicle.segment = def.path.len().saturating_sub(2);
            vehicle.progress = 1.0;
            if let Some(end) = def.path.last() {
                vehicle.position = *end;
            }
        }
    }
}

/// Advance every vehicle by `dt`, resolving any transactions that come due.
pub(crate) fn drive_vehicles(
    state: &mut TwinState,
    plant: &Plant,
    dt: f64,
    rng: &mut impl Rng,
    events: &mut Vec<EventEnvelope>,
) {
    let constants = &plant.content.constants;

    for def in &plant.content.vehicles {
        let Some(vehicle) = state.vehicles.get_mut(&def.id) else {
            tracing::warn!(vehicle = %def.id, "vehicle missing from state, skipping");
            continue;
        };
        let from = vehicle.motion;
        let request = advance_motion(vehicle, def, dt, constants, rng);
        let cargo_before = vehicle.cargo_weight;

        if let Some(request) = request {
            let result = request_transaction(state, plant, &request, cargo_before);
            let Some(vehicle) = state.vehicles.get_mut(&def.id) else {
                continue;
            };
            complete_transaction(vehicle, def, request.direction, result.admitted);
            let residual = vehicle.cargo_weight;
            let station_id = result.record.and_then(|record| record.station_id);
            let tick = state.stats.uptime_ticks;
            let event = match request.direction {
                Direction::Load => Event::VehicleLoaded {
                    vehicle_id: def.id.clone(),
                    station_id,
                    requested: request.requested,
                    admitted: result.admitted,
                },
                Direction::Unload => Event::VehicleUnloaded {
                    vehicle_id: def.id.clone(),
                    station_id,
                    requested: request.requested,
                    admitted: result.admitted,
                    residual,
                },
            };
            events.push(crate::emit(&mut state.counters, tick, event));
        }

        let to = state.vehicles.get(&def.id).map(|v| v.motion);
        if let Some(to) = to.filter(|to| *to != from) {
            let tick = state.stats.uptime_ticks;
            events.push(crate::emit(
                &mut state.counters,
                tick,
                Event::VehicleStateChanged {
                    vehicle_id: def.id.clone(),
                    from,
                    to,
                },
            ));
        }
    }
}
