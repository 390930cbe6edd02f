use std::collections::VecDeque;
use std::sync::Arc;

use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast;
use twin_core::{EventEnvelope, MetricsSnapshot, Plant, TransportStrategy, TwinState};

use crate::alerts::AlertEngine;

/// Oldest samples are dropped beyond this many.
const MAX_METRICS_HISTORY: usize = 10_000;

pub struct SimState {
    pub twin: TwinState,
    pub plant: Plant,
    pub rng: ChaCha8Rng,
    pub metrics_every: u64,
    pub metrics_history: VecDeque<MetricsSnapshot>,
    pub alert_engine: AlertEngine,
    /// Clients currently rendering the line. Vehicles animate while any are attached.
    pub observers: u32,
    pub frames_per_tick: u32,
}

impl SimState {
    pub fn new(
        twin: TwinState,
        plant: Plant,
        rng: ChaCha8Rng,
        metrics_every: u64,
        frames_per_tick: u32,
    ) -> Self {
        let reagent_buffers = twin.stations.values().filter(|s| s.aux.is_some()).count();
        Self {
            twin,
            plant,
            rng,
            metrics_every,
            metrics_history: VecDeque::new(),
            alert_engine: AlertEngine::new(reagent_buffers),
            observers: 0,
            frames_per_tick: frames_per_tick.max(1),
        }
    }

    pub fn strategy(&self) -> TransportStrategy {
        if self.observers > 0 {
            TransportStrategy::Animated
        } else {
            TransportStrategy::Headless
        }
    }

    /// Simulated time covered by one loop iteration.
    pub fn frame_dt(&self) -> f64 {
        self.plant.content.constants.tick_seconds / f64::from(self.frames_per_tick)
    }

    pub fn push_metrics(&mut self, snapshot: MetricsSnapshot) {
        if self.metrics_history.len() >= MAX_METRICS_HISTORY {
            self.metrics_history.pop_front();
        }
        self.metrics_history.push_back(snapshot);
    }
}

pub type SharedSim = Arc<parking_lot::Mutex<SimState>>;
pub type EventTx = broadcast::Sender<Vec<EventEnvelope>>;

#[derive(Clone)]
pub struct AppState {
    pub sim: SharedSim,
    pub event_tx: EventTx,
    pub ticks_per_sec: f64,
}

impl AppState {
    /// Send events to stream subscribers. No subscribers is not an error.
    pub fn broadcast(&self, events: Vec<EventEnvelope>) {
        if !events.is_empty() {
            let _ = self.event_tx.send(events);
        }
    }
}
