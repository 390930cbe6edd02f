use std::collections::{HashSet, VecDeque};

use twin_core::{AlertSeverity, Counters, Event, EventEnvelope, EventId, MetricsSnapshot};

/// Aux level below which a dual-input station is about to starve on reagent.
const REAGENT_LOW_LEVEL: f64 = 50.0;

type RuleFn = fn(&VecDeque<MetricsSnapshot>, &AlertEngine) -> bool;

struct AlertRule {
    id: &'static str,
    severity: AlertSeverity,
    check: RuleFn,
    message: &'static str,
    suggested_action: &'static str,
}

const RULES: &[AlertRule] = &[
    AlertRule {
        id: "STATION_BACKPRESSURE",
        severity: AlertSeverity::Warning,
        check: |h, _| h.len() >= 3 && tail(h, 3).iter().all(|s| s.stations_backpressured > 0),
        message: "Stations blocked by a full output buffer for 3+ samples",
        suggested_action: "Check the downstream vehicle or transfer route for this station",
    },
    AlertRule {
        id: "STATION_STARVED",
        severity: AlertSeverity::Warning,
        check: |h, _| h.len() >= 3 && tail(h, 3).iter().all(|s| s.stations_starved > 0),
        message: "Stations idle on an empty input buffer for 3+ samples",
        suggested_action: "Check the upstream supply and loading vehicles",
    },
    AlertRule {
        id: "REAGENT_LOW",
        severity: AlertSeverity::Critical,
        check: |h, engine| {
            engine.reagent_buffers > 0
                && latest(h).is_some_and(|s| s.min_aux_level < REAGENT_LOW_LEVEL)
        },
        message: "Reagent buffer nearly empty on a dual-input station",
        suggested_action: "Verify the reagent pump is running and its feed is connected",
    },
    AlertRule {
        id: "THROUGHPUT_STALL",
        severity: AlertSeverity::Warning,
        check: |h, _| {
            let recent = tail(h, 10);
            if recent.len() < 5 {
                return false;
            }
            let processed =
                max_f(&recent, |s| s.total_processed) - min_f(&recent, |s| s.total_processed);
            let ticks = max_u(&recent, |s| s.tick) - min_u(&recent, |s| s.tick);
            ticks > 0 && processed <= f64::EPSILON
        },
        message: "No material converted across the last samples",
        suggested_action: "Inspect station buffers for a line-wide stall",
    },
    AlertRule {
        id: "SINK_IDLE",
        severity: AlertSeverity::Warning,
        check: |h, _| {
            let recent = tail(h, 10);
            if recent.len() < 10 {
                return false;
            }
            let delivered =
                max_f(&recent, |s| s.sink_removed) - min_f(&recent, |s| s.sink_removed);
            let produced =
                max_f(&recent, |s| s.total_processed) - min_f(&recent, |s| s.total_processed);
            delivered <= f64::EPSILON && produced > 0.0
        },
        message: "Line is producing but nothing reaches the sink",
        suggested_action: "Attach an observer or check the delivery vehicle",
    },
];

// --- Helpers for querying recent snapshots ---

fn latest(h: &VecDeque<MetricsSnapshot>) -> Option<&MetricsSnapshot> {
    h.back()
}

fn tail(h: &VecDeque<MetricsSnapshot>, n: usize) -> Vec<&MetricsSnapshot> {
    h.iter().rev().take(n).collect()
}

fn max_f(snapshots: &[&MetricsSnapshot], f: fn(&MetricsSnapshot) -> f64) -> f64 {
    snapshots
        .iter()
        .map(|s| f(s))
        .fold(f64::NEG_INFINITY, f64::max)
}

fn min_f(snapshots: &[&MetricsSnapshot], f: fn(&MetricsSnapshot) -> f64) -> f64 {
    snapshots.iter().map(|s| f(s)).fold(f64::INFINITY, f64::min)
}

fn max_u(snapshots: &[&MetricsSnapshot], f: fn(&MetricsSnapshot) -> u64) -> u64 {
    snapshots.iter().map(|s| f(s)).max().unwrap_or(0)
}

fn min_u(snapshots: &[&MetricsSnapshot], f: fn(&MetricsSnapshot) -> u64) -> u64 {
    snapshots.iter().map(|s| f(s)).min().unwrap_or(0)
}

// --- AlertEngine ---

pub struct AlertEngine {
    active: HashSet<String>,
    reagent_buffers: usize,
}

impl AlertEngine {
    /// `reagent_buffers` is the number of stations carrying an aux buffer.
    pub fn new(reagent_buffers: usize) -> Self {
        Self {
            active: HashSet::new(),
            reagent_buffers,
        }
    }

    /// Returns current active alert IDs (for the /api/v1/alerts endpoint).
    pub fn active_alert_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Evaluate all rules against recent metrics history. Returns events for state changes.
    pub fn evaluate(
        &mut self,
        history: &VecDeque<MetricsSnapshot>,
        tick: u64,
        counters: &mut Counters,
    ) -> Vec<EventEnvelope> {
        let mut events = Vec::new();

        for rule in RULES {
            let fired = (rule.check)(history, self);
            let was_active = self.active.contains(rule.id);

            if fired && !was_active {
                self.active.insert(rule.id.to_string());
                tracing::warn!(alert = rule.id, tick, "alert raised");
                events.push(make_envelope(
                    counters,
                    tick,
                    Event::AlertRaised {
                        alert_id: rule.id.to_string(),
                        severity: rule.severity.clone(),
                        message: rule.message.to_string(),
                        suggested_action: rule.suggested_action.to_string(),
                    },
                ));
            } else if !fired && was_active {
                self.active.remove(rule.id);
                tracing::info!(alert = rule.id, tick, "alert cleared");
                events.push(make_envelope(
                    counters,
                    tick,
                    Event::AlertCleared {
                        alert_id: rule.id.to_string(),
                    },
                ));
            }
        }

        events
    }
}

fn make_envelope(counters: &mut Counters, tick: u64, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, tick, event }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_core::test_fixtures::{base_plant, base_state};

    fn quiet_snapshot(tick: u64) -> MetricsSnapshot {
        let plant = base_plant();
        let state = base_state(&plant);
        let mut snapshot = twin_core::compute_metrics(&state, &plant);
        snapshot.tick = tick;
        snapshot.min_aux_level = 500.0;
        snapshot
    }

    fn test_counters() -> Counters {
        Counters {
            next_event_id: 0,
            next_transaction_id: 0,
        }
    }

    fn raised(events: &[EventEnvelope], id: &str) -> bool {
        events
            .iter()
            .any(|e| matches!(&e.event, Event::AlertRaised { alert_id, .. } if alert_id == id))
    }

    fn cleared(events: &[EventEnvelope], id: &str) -> bool {
        events
            .iter()
            .any(|e| matches!(&e.event, Event::AlertCleared { alert_id } if alert_id == id))
    }

    #[test]
    fn new_engine_has_no_active_alerts() {
        let engine = AlertEngine::new(1);
        assert!(engine.active_alert_ids().is_empty());
    }

    #[test]
    fn evaluate_with_empty_history_fires_nothing() {
        let history = VecDeque::new();
        let mut counters = test_counters();
        let mut engine = AlertEngine::new(1);
        let events = engine.evaluate(&history, 1, &mut counters);
        assert!(events.is_empty());
    }

    #[test]
    fn reagent_low_raises_once_then_clears() {
        let mut history = VecDeque::new();
        let mut counters = test_counters();
        let mut engine = AlertEngine::new(1);

        let mut snap = quiet_snapshot(1);
        snap.min_aux_level = 10.0;
        history.push_back(snap);

        let events = engine.evaluate(&history, 1, &mut counters);
        assert!(raised(&events, "REAGENT_LOW"));
        assert_eq!(engine.active_alert_ids(), vec!["REAGENT_LOW".to_string()]);

        let events = engine.evaluate(&history, 2, &mut counters);
        assert!(
            !raised(&events, "REAGENT_LOW") && !cleared(&events, "REAGENT_LOW"),
            "no state change should mean no events"
        );

        history.clear();
        history.push_back(quiet_snapshot(3));
        let events = engine.evaluate(&history, 3, &mut counters);
        assert!(cleared(&events, "REAGENT_LOW"));
        assert!(engine.active_alert_ids().is_empty());
    }

    #[test]
    fn reagent_low_ignored_without_aux_buffers() {
        let mut history = VecDeque::new();
        let mut counters = test_counters();
        let mut engine = AlertEngine::new(0);

        let mut snap = quiet_snapshot(1);
        snap.min_aux_level = 0.0;
        history.push_back(snap);

        let events = engine.evaluate(&history, 1, &mut counters);
        assert!(!raised(&events, "REAGENT_LOW"));
    }

    #[test]
    fn backpressure_needs_three_consecutive_samples() {
        let mut history = VecDeque::new();
        let mut counters = test_counters();
        let mut engine = AlertEngine::new(1);

        for tick in 1..=2 {
            let mut snap = quiet_snapshot(tick);
            snap.stations_backpressured = 1;
            history.push_back(snap);
            let events = engine.evaluate(&history, tick, &mut counters);
            assert!(!raised(&events, "STATION_BACKPRESSURE"));
        }

        let mut snap = quiet_snapshot(3);
        snap.stations_backpressured = 2;
        history.push_back(snap);
        let events = engine.evaluate(&history, 3, &mut counters);
        assert!(raised(&events, "STATION_BACKPRESSURE"));
    }

    #[test]
    fn starved_station_clears_when_fed() {
        let mut history = VecDeque::new();
        let mut counters = test_counters();
        let mut engine = AlertEngine::new(1);

        for tick in 1..=3 {
            let mut snap = quiet_snapshot(tick);
            snap.stations_starved = 1;
            history.push_back(snap);
        }
        assert!(raised(
            &engine.evaluate(&history, 3, &mut counters),
            "STATION_STARVED"
        ));

        history.push_back(quiet_snapshot(4));
        assert!(cleared(
            &engine.evaluate(&history, 4, &mut counters),
            "STATION_STARVED"
        ));
    }

    #[test]
    fn throughput_stall_fires_on_flat_processing() {
        let mut history = VecDeque::new();
        let mut counters = test_counters();
        let mut engine = AlertEngine::new(1);

        for tick in 1..=5 {
            let mut snap = quiet_snapshot(tick * 10);
            snap.total_processed = 1234.0;
            history.push_back(snap);
        }
        let events = engine.evaluate(&history, 50, &mut counters);
        assert!(raised(&events, "THROUGHPUT_STALL"));
    }

    #[test]
    fn sink_idle_requires_production_without_delivery() {
        let mut history = VecDeque::new();
        let mut counters = test_counters();
        let mut engine = AlertEngine::new(1);

        for tick in 1..=10_u32 {
            let mut snap = quiet_snapshot(u64::from(tick));
            snap.total_processed = f64::from(tick) * 100.0;
            snap.sink_removed = 0.0;
            history.push_back(snap);
        }
        let events = engine.evaluate(&history, 10, &mut counters);
        assert!(raised(&events, "SINK_IDLE"));
        assert!(!raised(&events, "THROUGHPUT_STALL"));
    }

    #[test]
    fn alert_event_ids_continue_the_counter() {
        let mut history = VecDeque::new();
        let mut counters = Counters {
            next_event_id: 41,
            next_transaction_id: 0,
        };
        let mut engine = AlertEngine::new(1);

        let mut snap = quiet_snapshot(1);
        snap.min_aux_level = 0.0;
        history.push_back(snap);

        let events = engine.evaluate(&history, 1, &mut counters);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.0, "evt_000041");
        assert_eq!(counters.next_event_id, 42);
    }
}
