//! Fixed-rate station-to-station transfer used while vehicles are not animated.

use crate::{clamp_level, Event, EventEnvelope, Plant, TwinState};

/// Amount a headless route may move this tick.
pub fn plan_transfer(from_output: f64, to_input: f64, rate: f64, capacity: f64) -> f64 {
    from_output.min(rate).min(capacity - to_input).max(0.0)
}

/// Run every configured route once, in order. Returns the total moved.
pub(crate) fn run_headless_transfers(
    state: &mut TwinState,
    plant: &Plant,
    events: &mut Vec<EventEnvelope>,
) -> f64 {
    let capacity = plant.capacity();
    let rate = plant.content.constants.transfer_rate;
    let tick = state.stats.uptime_ticks;
    let mut moved = 0.0;

    for route in &plant.content.transfer_routes {
        let (Some(from), Some(to)) = (
            state.stations.get(&route.from).map(|s| s.output_level),
            state.stations.get(&route.to).map(|s| s.input_level),
        ) else {
            tracing::warn!(from = %route.from, to = %route.to, "transfer route endpoint missing");
            continue;
        };
        let amount = plan_transfer(from, to, rate, capacity);
        if amount <= 0.0 {
            continue;
        }

        if let Some(source) = state.stations.get_mut(&route.from) {
            source.output_level = clamp_level(from - amount, capacity);
        }
        if let Some(dest) = state.stations.get_mut(&route.to) {
            dest.input_level = clamp_level(to + amount, capacity);
        }
        state.stats.total_transported += amount;
        moved += amount;

        events.push(crate::emit(
            &mut state.counters,
            tick,
            Event::HeadlessTransfer {
                from: route.from.clone(),
                to: route.to.clone(),
                amount,
            },
        ));
    }

    moved
}
