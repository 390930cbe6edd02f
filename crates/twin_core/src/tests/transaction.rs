use super::*;

#[test]
fn test_load_admits_what_the_source_holds() {
    let plant = base_plant();
    let mut state = base_state(&plant);
    station_mut(&mut state, "D001").output_level = 120.0;

    let result = request_transaction(&mut state, &plant, &load("AGV-02", 800.0), 0.0);

    assert!(approx(result.admitted, 120.0));
    assert!(approx(station(&state, "D001").output_level, 0.0));
    let record = result.record.unwrap();
    assert_eq!(record.station_id, Some(sid("D001")));
    assert!(approx(record.station_before, 120.0));
    assert!(approx(record.station_after, 0.0));
    assert!(approx(record.vehicle_after, 120.0));
}

#[test]
fn test_unload_admits_destination_headroom() {
    let plant = base_plant();
    let mut state = base_state(&plant);
    station_mut(&mut state, "D002").input_level = 1950.0;

    let result = request_transaction(&mut state, &plant, &unload("AGV-02", 100.0), 100.0);

    assert!(approx(result.admitted, 50.0));
    assert!(approx(station(&state, "D002").input_level, 2000.0));
    let record = result.record.unwrap();
    assert!(approx(record.vehicle_before, 100.0));
    assert!(approx(record.vehicle_after, 50.0));
    assert!(approx(state.stats.total_transported, 50.0));
    assert_eq!(state.stats.cycle_count, 1);
}

#[test]
fn test_resolve_leaves_registry_untouched() {
    let plant = base_plant();
    let mut state = base_state(&plant);
    station_mut(&mut state, "D001").output_level = 120.0;

    let resolution = resolve(
        &load("AGV-02", 800.0),
        &plant.routes,
        &state.stations,
        plant.capacity(),
    )
    .unwrap();

    assert!(approx(resolution.admitted, 120.0));
    assert_eq!(
        resolution.counterpart,
        Counterpart::Station {
            id: sid("D001"),
            before: 120.0,
            after: 0.0,
        }
    );
    assert!(approx(station(&state, "D001").output_level, 120.0));
}

#[test]
fn test_missing_source_is_exogenous() {
    let plant = base_plant();
    let mut state = base_state(&plant);

    let result = request_transaction(&mut state, &plant, &load("AGV-01", 800.0), 0.0);

    assert!(approx(result.admitted, 800.0));
    assert_eq!(result.record.unwrap().station_id, None);
    assert!(approx(state.ledger.source_injected, 800.0));
}

#[test]
fn test_missing_destination_is_terminal_sink() {
    let plant = base_plant();
    let mut state = base_state(&plant);

    let result = request_transaction(&mut state, &plant, &unload("AGV-05", 300.0), 300.0);

    assert!(approx(result.admitted, 300.0));
    assert!(approx(state.ledger.sink_removed, 300.0));
    assert!(approx(state.stats.total_transported, 300.0));
    assert_eq!(state.stats.cycle_count, 1);
}

#[test]
fn test_unload_capped_at_vehicle_cargo() {
    let plant = base_plant();
    let mut state = base_state(&plant);

    let result = request_transaction(&mut state, &plant, &unload("AGV-05", 500.0), 100.0);

    assert!(approx(result.admitted, 100.0));
    assert!(approx(state.ledger.sink_removed, 100.0));
}

#[test]
fn test_unknown_vehicle_admits_nothing() {
    let plant = base_plant();
    let mut state = base_state(&plant);

    let result = request_transaction(&mut state, &plant, &load("AGV-99", 100.0), 0.0);

    assert!(approx(result.admitted, 0.0));
    assert!(result.record.is_none());
    assert!(state.audit.is_empty());
}

#[test]
fn test_route_to_missing_station_admits_nothing() {
    let plant = base_plant();
    let mut state = base_state(&plant);
    state.stations.remove(&sid("D001"));

    let result = request_transaction(&mut state, &plant, &load("AGV-02", 100.0), 0.0);

    assert!(approx(result.admitted, 0.0));
    assert!(result.record.is_none());
}

#[test]
fn test_invalid_requests_read_as_zero() {
    let plant = base_plant();
    let mut state = base_state(&plant);

    for requested in [-50.0, f64::NAN, f64::INFINITY] {
        let result = request_transaction(&mut state, &plant, &load("AGV-02", requested), 0.0);
        assert!(approx(result.admitted, 0.0), "request {requested}");
    }
    assert!(approx(station(&state, "D001").output_level, 200.0));
}

#[test]
fn test_empty_unload_does_not_count_a_cycle() {
    let plant = base_plant();
    let mut state = base_state(&plant);
    station_mut(&mut state, "D002").input_level = 2000.0;

    let result = request_transaction(&mut state, &plant, &unload("AGV-02", 100.0), 100.0);

    assert!(approx(result.admitted, 0.0));
    assert_eq!(state.stats.cycle_count, 0);
    assert_eq!(state.audit.len(), 1);
}

#[test]
fn test_audit_keeps_most_recent_hundred() {
    let plant = base_plant();
    let mut state = base_state(&plant);

    for _ in 0..150 {
        request_transaction(&mut state, &plant, &load("AGV-01", 1.0), 0.0);
    }

    assert_eq!(state.audit.len(), 100);
    let ids: Vec<u64> = state.audit.iter().map(|r| r.id).collect();
    assert_eq!(ids, (50..150).collect::<Vec<u64>>());
}
