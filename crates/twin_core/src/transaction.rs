//! Vehicle transaction resolver.
//!
//! A load or unload request is resolved in two phases: `resolve` computes the
//! admitted amount and the station delta without touching state, then
//! `request_transaction` commits it to the registry, ledger, statistics and
//! audit log.

use std::collections::HashMap;

use crate::{
    clamp_level, Direction, Plant, RouteTable, StationId, StationState, TransactionRecord,
    TwinState, VehicleId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub vehicle_id: VehicleId,
    pub direction: Direction,
    pub requested: f64,
}

/// What the caller gets back from every request. `admitted` is always set.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResult {
    pub admitted: f64,
    /// `None` when the request was rejected as a configuration error.
    pub record: Option<TransactionRecord>,
}

/// Which side of the system boundary a transaction touched.
#[derive(Debug, Clone, PartialEq)]
pub enum Counterpart {
    Station {
        id: StationId,
        before: f64,
        after: f64,
    },
    /// A vehicle with no configured source draws from outside the system.
    ExogenousSource,
    /// A vehicle with no configured destination delivers out of the system.
    TerminalSink,
}

/// Pure outcome of a request, before anything is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub admitted: f64,
    pub counterpart: Counterpart,
}

fn sanitize(requested: f64) -> f64 {
    if requested.is_finite() {
        requested.max(0.0)
    } else {
        0.0
    }
}

/// Compute the admissible amount for a request.
///
/// Loads are bounded by what the source has produced; unloads by the
/// destination's headroom. Returns `None` for an unknown vehicle or a route
/// naming a station missing from the registry.
pub fn resolve(
    request: &TransactionRequest,
    routes: &RouteTable,
    stations: &HashMap<StationId, StationState>,
    capacity: f64,
) -> Option<Resolution> {
    let route = routes.get(&request.vehicle_id)?;
    let requested = sanitize(request.requested);

    let endpoint = match request.direction {
        Direction::Load => route.source.as_ref(),
        Direction::Unload => route.destination.as_ref(),
    };

    let Some(station_id) = endpoint else {
        let counterpart = match request.direction {
            Direction::Load => Counterpart::ExogenousSource,
            Direction::Unload => Counterpart::TerminalSink,
        };
        return Some(Resolution {
            admitted: requested,
            counterpart,
        });
    };

    let station = stations.get(station_id)?;
    let (admitted, before, after) = match request.direction {
        Direction::Load => {
            let before = station.output_level;
            let admitted = requested.min(before).max(0.0);
            (admitted, before, clamp_level(before - admitted, capacity))
        }
        Direction::Unload => {
            let before = station.input_level;
            let admitted = requested.min(capacity - before).max(0.0);
            (admitted, before, clamp_level(before + admitted, capacity))
        }
    };

    Some(Resolution {
        admitted,
        counterpart: Counterpart::Station {
            id: station_id.clone(),
            before,
            after,
        },
    })
}

/// Resolve and commit a request.
///
/// `vehicle_before` is the cargo the vehicle holds when it asks. Unload
/// requests are capped at that cargo. The caller adopts `admitted` as the
/// change to its cargo.
pub fn request_transaction(
    state: &mut TwinState,
    plant: &Plant,
    request: &TransactionRequest,
    vehicle_before: f64,
) -> TransactionResult {
    let mut request = request.clone();
    if request.direction == Direction::Unload {
        request.requested = sanitize(request.requested).min(vehicle_before.max(0.0));
    }

    let Some(resolution) = resolve(&request, &plant.routes, &state.stations, plant.capacity())
    else {
        tracing::warn!(
            vehicle = %request.vehicle_id,
            direction = ?request.direction,
            "transaction for unknown vehicle or station, admitting nothing"
        );
        return TransactionResult {
            admitted: 0.0,
            record: None,
        };
    };

    let admitted = resolution.admitted;
    let (station_id, station_before, station_after) = match &resolution.counterpart {
        Counterpart::Station { id, before, after } => {
            if let Some(station) = state.stations.get_mut(id) {
                match request.direction {
                    Direction::Load => station.output_level = *after,
                    Direction::Unload => station.input_level = *after,
                }
            }
            (Some(id.clone()), *before, *after)
        }
        Counterpart::ExogenousSource => {
            state.ledger.source_injected += admitted;
            (None, 0.0, 0.0)
        }
        Counterpart::TerminalSink => {
            state.ledger.sink_removed += admitted;
            (None, 0.0, 0.0)
        }
    };

    let vehicle_after = match request.direction {
        Direction::Load => vehicle_before + admitted,
        Direction::Unload => (vehicle_before - admitted).max(0.0),
    };

    if request.direction == Direction::Unload && admitted > 0.0 {
        state.stats.total_transported += admitted;
        state.stats.cycle_count += 1;
    }

    let record = TransactionRecord {
        id: state.counters.next_transaction_id,
        tick: state.stats.uptime_ticks,
        sim_time: state.meta.sim_time,
        vehicle_id: request.vehicle_id.clone(),
        direction: request.direction,
        station_id,
        requested: request.requested,
        admitted,
        station_before,
        station_after,
        vehicle_before,
        vehicle_after,
    };
    state.counters.next_transaction_id += 1;
    state.audit.record(record.clone());

    tracing::debug!(
        vehicle = %record.vehicle_id,
        direction = ?record.direction,
        requested = record.requested,
        admitted,
        "material transaction"
    );

    TransactionResult {
        admitted,
        record: Some(record),
    }
}
