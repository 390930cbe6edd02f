//! `twin_core` — deterministic material-flow simulation of a distillation line.
//!
//! No IO, no network. All randomness via the passed-in Rng.

mod audit;
mod engine;
mod layout;
mod ledger;
pub mod metrics;
mod station;
mod telemetry;
mod transaction;
mod transfer;
mod types;
mod vehicle;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub use audit::AuditLog;
pub use engine::{efficiency, initial_state, set_running, tick};
pub use layout::{validate_layout, LayoutError, Plant, RouteTable, MIN_TICK_SECONDS};
pub use ledger::{conservation_error, material_in_system};
pub use metrics::{compute_metrics, write_metrics_csv, MetricsFileWriter, MetricsSnapshot};
pub use station::{advance, StationAdvance};
pub use telemetry::{apply_telemetry, TelemetryMessage};
pub use transaction::{
    request_transaction, resolve, Counterpart, Resolution, TransactionRequest, TransactionResult,
};
pub use transfer::plan_transfer;
pub use types::*;
pub use vehicle::{advance_motion, complete_transaction, new_vehicle};

pub(crate) fn emit(counters: &mut Counters, tick: u64, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, tick, event }
}

/// Clamp a buffer level into `[0, capacity]`. NaN reads as empty.
pub(crate) fn clamp_level(value: f64, capacity: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, capacity)
    }
}

#[cfg(test)]
mod tests;
