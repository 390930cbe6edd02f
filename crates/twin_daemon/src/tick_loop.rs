use std::time::Duration;

use twin_core::{EventEnvelope, EventLevel};

use crate::state::{EventTx, SharedSim, SimState};

/// Run one frame: advance the twin, then sample metrics and alerts on tick boundaries.
pub fn step(sim: &mut SimState) -> Vec<EventEnvelope> {
    let before = sim.twin.stats.uptime_ticks;
    let strategy = sim.strategy();
    let dt = sim.frame_dt();
    let mut events = twin_core::tick(
        &mut sim.twin,
        &sim.plant,
        strategy,
        dt,
        &mut sim.rng,
        EventLevel::Normal,
    );

    let now = sim.twin.stats.uptime_ticks;
    if now != before && sim.metrics_every > 0 && now % sim.metrics_every == 0 {
        let snapshot = twin_core::compute_metrics(&sim.twin, &sim.plant);
        sim.push_metrics(snapshot);
        let alerts = sim
            .alert_engine
            .evaluate(&sim.metrics_history, now, &mut sim.twin.counters);
        events.extend(alerts);
    }
    events
}

pub async fn run_tick_loop(
    sim: SharedSim,
    event_tx: EventTx,
    frames_per_sec: f64,
    max_ticks: Option<u64>,
) {
    let period = if frames_per_sec > 0.0 {
        Duration::try_from_secs_f64(1.0 / frames_per_sec)
            .ok()
            .filter(|period| !period.is_zero())
    } else {
        None
    };
    if frames_per_sec > 0.0 && period.is_none() {
        tracing::warn!(frames_per_sec, "frame period out of range, running unpaced");
    }
    let mut interval = period.map(|period| {
        let mut iv = tokio::time::interval(period);
        iv.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        iv
    });

    loop {
        let (events, done) = {
            let mut guard = sim.lock();
            let events = step(&mut guard);
            let done = max_ticks.is_some_and(|max| guard.twin.stats.uptime_ticks >= max);
            (events, done)
        };

        if !events.is_empty() {
            let _ = event_tx.send(events);
        }

        if done {
            tracing::info!("max ticks reached, tick loop stopping");
            break;
        }

        if let Some(ref mut iv) = interval {
            iv.tick().await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}
