use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use twin_core::{EventEnvelope, MetricsSnapshot, SimulationStats, TelemetryMessage, TransactionRecord};

use crate::state::AppState;

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, "http://localhost:5173").expect("default origin is valid")
}

pub fn make_router_with_cors(state: AppState, cors_origin: &str) -> Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid CORS origin: {cors_origin}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/snapshot", get(snapshot_handler))
        .route("/api/v1/stats", get(stats_handler))
        .route("/api/v1/transactions", get(transactions_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/alerts", get(alerts_handler))
        .route("/api/v1/stream", get(stream_handler))
        .route("/api/v1/pause", post(pause_handler))
        .route("/api/v1/resume", post(resume_handler))
        .route("/api/v1/observer/attach", post(attach_handler))
        .route("/api/v1/observer/detach", post(detach_handler))
        .route("/api/v1/telemetry", post(telemetry_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let sim = app_state.sim.lock();
    let meta = &sim.twin.meta;
    Json(serde_json::json!({
        "tick": sim.twin.stats.uptime_ticks,
        "frame": meta.frame,
        "seed": meta.seed,
        "content_version": meta.content_version,
        "running": meta.running,
        "strategy": sim.strategy(),
        "observers": sim.observers,
        "ticks_per_sec": app_state.ticks_per_sec,
        "frames_per_tick": sim.frames_per_tick,
    }))
}

pub async fn snapshot_handler(
    State(app_state): State<AppState>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let sim = app_state.sim.lock();
    match serde_json::to_string(&sim.twin) {
        Ok(json) => {
            drop(sim);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                json,
            )
        }
        Err(err) => {
            tracing::error!("snapshot serialization failed: {err}");
            drop(sim);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                r#"{"error":"serialization failed"}"#.to_string(),
            )
        }
    }
}

pub async fn stats_handler(State(app_state): State<AppState>) -> Json<SimulationStats> {
    Json(app_state.sim.lock().twin.stats.clone())
}

/// Audit log, oldest first.
pub async fn transactions_handler(
    State(app_state): State<AppState>,
) -> Json<Vec<TransactionRecord>> {
    Json(app_state.sim.lock().twin.audit.to_vec())
}

pub async fn metrics_handler(
    State(app_state): State<AppState>,
) -> Json<VecDeque<MetricsSnapshot>> {
    let sim = app_state.sim.lock();
    Json(sim.metrics_history.clone())
}

async fn alerts_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let active_ids = app_state.sim.lock().alert_engine.active_alert_ids();
    Json(serde_json::json!({ "active_alerts": active_ids }))
}

fn set_running(app_state: &AppState, running: bool) -> Json<serde_json::Value> {
    let event = twin_core::set_running(&mut app_state.sim.lock().twin, running);
    app_state.broadcast(event.into_iter().collect());
    Json(serde_json::json!({ "running": running }))
}

pub async fn pause_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    set_running(&app_state, false)
}

pub async fn resume_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    set_running(&app_state, true)
}

pub async fn attach_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let mut sim = app_state.sim.lock();
    sim.observers += 1;
    tracing::info!(observers = sim.observers, "observer attached");
    Json(serde_json::json!({
        "observers": sim.observers,
        "strategy": sim.strategy(),
    }))
}

pub async fn detach_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let mut sim = app_state.sim.lock();
    if sim.observers == 0 {
        tracing::warn!("observer detach with none attached");
    }
    sim.observers = sim.observers.saturating_sub(1);
    tracing::info!(observers = sim.observers, "observer detached");
    Json(serde_json::json!({
        "observers": sim.observers,
        "strategy": sim.strategy(),
    }))
}

pub async fn telemetry_handler(
    State(app_state): State<AppState>,
    Json(message): Json<TelemetryMessage>,
) -> Json<serde_json::Value> {
    let event = {
        let mut guard = app_state.sim.lock();
        let sim = &mut *guard;
        twin_core::apply_telemetry(&mut sim.twin, &sim.plant, &message)
    };
    let applied = event.is_some();
    app_state.broadcast(event.into_iter().collect());
    Json(serde_json::json!({ "applied": applied }))
}

pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = app_state.event_tx.subscribe();
    let sim = app_state.sim.clone();

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_millis(200));
        heartbeat.tick().await; // discard the immediate first tick
        let mut flush = tokio::time::interval(Duration::from_millis(50));
        flush.tick().await; // discard the immediate first tick
        let mut pending: Vec<EventEnvelope> = Vec::new();
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(events) => pending.extend(events),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "stream subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = flush.tick() => {
                    if !pending.is_empty() {
                        let data = serde_json::to_string(&pending).unwrap_or_default();
                        pending.clear();
                        yield Ok(Event::default().data(data));
                    }
                }
                _ = heartbeat.tick() => {
                    let (tick, running) = {
                        let sim = sim.lock();
                        (sim.twin.stats.uptime_ticks, sim.twin.meta.running)
                    };
                    let hb = serde_json::json!({"heartbeat": true, "tick": tick, "running": running});
                    yield Ok(Event::default().data(hb.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SimState;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use twin_core::test_fixtures::{base_plant, base_state, make_rng, sid};

    fn make_test_state() -> AppState {
        let plant = base_plant();
        let twin = base_state(&plant);
        let (event_tx, _) = broadcast::channel(64);
        AppState {
            sim: Arc::new(parking_lot::Mutex::new(SimState::new(
                twin,
                plant,
                make_rng(),
                60,
                1,
            ))),
            event_tx,
            ticks_per_sec: 10.0,
        }
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = make_router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(
        state: &AppState,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = match body {
            Some(json) => Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = make_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_meta_reports_fresh_state() {
        let state = make_test_state();
        let (status, json) = get_json(&state, "/api/v1/meta").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tick"], 0);
        assert_eq!(json["seed"], 42);
        assert_eq!(json["running"], true);
        assert_eq!(json["strategy"], "headless");
        assert_eq!(json["observers"], 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_valid_json_with_stations() {
        let state = make_test_state();
        let (status, json) = get_json(&state, "/api/v1/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["stations"]["D001"].is_object());
        assert!(json["vehicles"]["AGV-01"].is_object());
    }

    #[tokio::test]
    async fn test_stats_and_transactions_start_empty() {
        let state = make_test_state();
        let (_, stats) = get_json(&state, "/api/v1/stats").await;
        assert_eq!(stats["uptime_ticks"], 0);
        let (_, transactions) = get_json(&state, "/api/v1/transactions").await;
        assert_eq!(transactions, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_alerts_and_metrics_start_empty() {
        let state = make_test_state();
        let (_, alerts) = get_json(&state, "/api/v1/alerts").await;
        assert_eq!(alerts["active_alerts"], serde_json::json!([]));
        let (_, metrics) = get_json(&state, "/api/v1/metrics").await;
        assert_eq!(metrics, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_pause_broadcasts_once() {
        let state = make_test_state();
        let mut rx = state.event_tx.subscribe();

        let (status, json) = post_json(&state, "/api/v1/pause", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["running"], false);
        let batch = rx.try_recv().unwrap();
        assert!(matches!(
            batch[0].event,
            twin_core::Event::SimulationPaused
        ));

        post_json(&state, "/api/v1/pause", None).await;
        assert!(rx.try_recv().is_err(), "second pause is a no-op");

        let (_, meta) = get_json(&state, "/api/v1/meta").await;
        assert_eq!(meta["running"], false);

        post_json(&state, "/api/v1/resume", None).await;
        let batch = rx.try_recv().unwrap();
        assert!(matches!(
            batch[0].event,
            twin_core::Event::SimulationResumed
        ));
    }

    #[tokio::test]
    async fn test_observers_toggle_strategy() {
        let state = make_test_state();

        let (_, json) = post_json(&state, "/api/v1/observer/attach", None).await;
        assert_eq!(json["observers"], 1);
        assert_eq!(json["strategy"], "animated");

        post_json(&state, "/api/v1/observer/attach", None).await;
        let (_, json) = post_json(&state, "/api/v1/observer/detach", None).await;
        assert_eq!(json["observers"], 1);
        assert_eq!(json["strategy"], "animated");

        let (_, json) = post_json(&state, "/api/v1/observer/detach", None).await;
        assert_eq!(json["strategy"], "headless");

        let (_, json) = post_json(&state, "/api/v1/observer/detach", None).await;
        assert_eq!(json["observers"], 0);
    }

    #[tokio::test]
    async fn test_telemetry_overrides_station_level() {
        let state = make_test_state();
        let (status, json) = post_json(
            &state,
            "/api/v1/telemetry",
            Some(serde_json::json!({
                "type": "station_update",
                "station_id": "D001",
                "input_level": 2500.0,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["applied"], true);

        let sim = state.sim.lock();
        let station = &sim.twin.stations[&sid("D001")];
        assert!((station.input_level - 2000.0).abs() < 1e-9);
        assert!(twin_core::conservation_error(&sim.twin, &sim.plant).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_telemetry_ignores_other_feeds() {
        let state = make_test_state();
        let (status, json) = post_json(
            &state,
            "/api/v1/telemetry",
            Some(serde_json::json!({ "type": "pit_update", "pit": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["applied"], false);
    }

    #[tokio::test]
    async fn test_telemetry_unknown_station_is_not_applied() {
        let state = make_test_state();
        let (status, json) = post_json(
            &state,
            "/api/v1/telemetry",
            Some(serde_json::json!({
                "type": "station_update",
                "station_id": "D404",
                "input_level": 10.0,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["applied"], false);
    }

    #[tokio::test]
    async fn test_telemetry_rejects_malformed_body() {
        let state = make_test_state();
        let (status, _) = post_json(
            &state,
            "/api/v1/telemetry",
            Some(serde_json::json!({ "station_id": "D001" })),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[test]
    fn test_bad_cors_origin_is_an_error() {
        assert!(make_router_with_cors(make_test_state(), "bad\norigin").is_err());
    }
}
