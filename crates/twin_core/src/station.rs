//! Station processing rule.
//!
//! `advance` is a pure function of one station's state for one tick;
//! `tick_stations` applies it across the registry in layout order.

use crate::{
    clamp_level, Event, EventEnvelope, EventLevel, Plant, StationId, StationKind, StationOutcome,
    StationState, TwinState,
};

/// Result of advancing one station by one tick.
#[derive(Debug, Clone)]
pub struct StationAdvance {
    pub station: StationState,
    /// Primary material converted from input to output.
    pub processed: f64,
    /// Auxiliary reagent consumed by the conversion.
    pub reagent_consumed: f64,
    /// Reagent a pump offers to another station's aux buffer.
    pub feed: Option<(StationId, f64)>,
    pub outcome: StationOutcome,
}

/// Compute a station's next state after one tick.
///
/// Stations never fail: missing input or reagent leaves the station unchanged
/// and reports `Starved`, a full output reports `Backpressured`.
pub fn advance(station: &StationState, kind: &StationKind, capacity: f64) -> StationAdvance {
    let mut next = station.clone();
    let mut processed = 0.0;
    let mut reagent_consumed = 0.0;
    let mut feed = None;

    let outcome = match kind {
        StationKind::Pump { feeds } => {
            next.output_level = clamp_level(next.output_level + next.process_rate, capacity);
            feed = Some((feeds.clone(), next.process_rate));
            StationOutcome::Pumping
        }
        StationKind::Converter => {
            if next.input_level <= 0.0 {
                StationOutcome::Starved
            } else if next.output_level >= capacity {
                StationOutcome::Backpressured
            } else {
                let amount = next
                    .input_level
                    .min(next.process_rate)
                    .min(capacity - next.output_level);
                next.input_level = clamp_level(next.input_level - amount, capacity);
                next.output_level = clamp_level(next.output_level + amount, capacity);
                processed = amount;
                StationOutcome::Processed
            }
        }
        StationKind::DualInput {
            aux_ratio,
            aux_threshold,
        } => {
            let aux_level = next.aux_level().unwrap_or(0.0);
            if aux_level <= *aux_threshold || next.input_level <= 0.0 {
                StationOutcome::Starved
            } else if next.output_level >= capacity {
                StationOutcome::Backpressured
            } else {
                // Never draw more reagent than the buffer holds.
                let amount = next
                    .input_level
                    .min(next.process_rate)
                    .min(capacity - next.output_level)
                    .min(aux_level / aux_ratio);
                let reagent = amount * aux_ratio;
                next.input_level = clamp_level(next.input_level - amount, capacity);
                next.output_level = clamp_level(next.output_level + amount, capacity);
                if let Some(aux) = next.aux.as_mut() {
                    aux.level = clamp_level(aux.level - reagent, capacity);
                }
                processed = amount;
                reagent_consumed = reagent;
                StationOutcome::Processed
            }
        }
    };

    next.last_outcome = outcome;
    StationAdvance {
        station: next,
        processed,
        reagent_consumed,
        feed,
        outcome,
    }
}

/// Advance every station once, in layout order. Returns the total processed.
///
/// Pump feeds land immediately, so a station later in the order sees the
/// reagent in the same tick.
pub(crate) fn tick_stations(
    state: &mut TwinState,
    plant: &Plant,
    event_level: EventLevel,
    events: &mut Vec<EventEnvelope>,
) -> f64 {
    let capacity = plant.capacity();
    let tick = state.stats.uptime_ticks;
    let mut total_processed = 0.0;

    for def in &plant.content.stations {
        let Some(station) = state.stations.get(&def.id) else {
            tracing::warn!(station = %def.id, "station missing from registry, skipping");
            continue;
        };
        let result = advance(station, &def.kind, capacity);
        state.stations.insert(def.id.clone(), result.station);

        total_processed += result.processed;
        state.ledger.reagent_consumed += result.reagent_consumed;

        if let Some((target, amount)) = result.feed {
            apply_feed(state, &def.id, &target, amount, capacity);
        }

        match result.outcome {
            StationOutcome::Processed => events.push(crate::emit(
                &mut state.counters,
                tick,
                Event::StationProcessed {
                    station_id: def.id.clone(),
                    amount: result.processed,
                },
            )),
            StationOutcome::Starved | StationOutcome::Backpressured
                if event_level == EventLevel::Debug =>
            {
                events.push(crate::emit(
                    &mut state.counters,
                    tick,
                    Event::StationStalled {
                        station_id: def.id.clone(),
                        outcome: result.outcome,
                    },
                ));
            }
            _ => {}
        }
    }

    total_processed
}

fn apply_feed(
    state: &mut TwinState,
    pump_id: &StationId,
    target: &StationId,
    amount: f64,
    capacity: f64,
) {
    let Some(aux) = state
        .stations
        .get_mut(target)
        .and_then(|station| station.aux.as_mut())
    else {
        tracing::warn!(pump = %pump_id, target = %target, "pump target has no aux buffer");
        return;
    };
    let before = aux.level;
    aux.level = clamp_level(before + amount, capacity);
    state.ledger.reagent_injected += aux.level - before;
}
