//! Live telemetry merged into the running state.
//!
//! Overrides land outside tick accounting: whatever they add or remove is
//! booked to `MassLedger::external_adjustment` so conservation still holds.

use serde::{Deserialize, Serialize};

use crate::{clamp_level, Event, EventEnvelope, Plant, StationId, TwinState, VehicleId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryMessage {
    StationUpdate {
        station_id: StationId,
        #[serde(default)]
        input_level: Option<f64>,
        #[serde(default)]
        output_level: Option<f64>,
        #[serde(default)]
        aux_level: Option<f64>,
    },
    VehicleUpdate {
        vehicle_id: VehicleId,
        #[serde(default)]
        temperature: Option<f64>,
        #[serde(default)]
        ph: Option<f64>,
    },
    /// Feeds the twin does not consume (pit, device, dashboard summaries).
    #[serde(other)]
    Other,
}

fn override_level(slot: &mut f64, value: Option<f64>, capacity: f64) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    let before = *slot;
    *slot = clamp_level(value, capacity);
    *slot - before
}

/// Merge one message. Returns an event when something was applied.
pub fn apply_telemetry(
    state: &mut TwinState,
    plant: &Plant,
    message: &TelemetryMessage,
) -> Option<EventEnvelope> {
    let capacity = plant.capacity();
    let target = match message {
        TelemetryMessage::StationUpdate {
            station_id,
            input_level,
            output_level,
            aux_level,
        } => {
            let Some(station) = state.stations.get_mut(station_id) else {
                tracing::warn!(station = %station_id, "telemetry for unknown station ignored");
                return None;
            };
            let mut delta = override_level(&mut station.input_level, *input_level, capacity);
            delta += override_level(&mut station.output_level, *output_level, capacity);
            match station.aux.as_mut() {
                Some(aux) => delta += override_level(&mut aux.level, *aux_level, capacity),
                None if aux_level.is_some() => {
                    tracing::warn!(station = %station_id, "station has no aux buffer, aux ignored");
                }
                None => {}
            }
            // Pump output is a counter, not stock.
            if !plant.is_pump(station_id) {
                state.ledger.external_adjustment += delta;
            }
            station_id.to_string()
        }
        TelemetryMessage::VehicleUpdate {
            vehicle_id,
            temperature,
            ph,
        } => {
            let Some(vehicle) = state.vehicles.get_mut(vehicle_id) else {
                tracing::warn!(vehicle = %vehicle_id, "telemetry for unknown vehicle ignored");
                return None;
            };
            if let Some(temperature) = temperature.filter(|t| t.is_finite()) {
                vehicle.cargo_temperature = temperature;
            }
            if let Some(ph) = ph.filter(|p| p.is_finite()) {
                vehicle.cargo_ph = ph;
            }
            vehicle_id.to_string()
        }
        TelemetryMessage::Other => return None,
    };

    Some(crate::emit(
        &mut state.counters,
        state.stats.uptime_ticks,
        Event::TelemetryApplied { target },
    ))
}
