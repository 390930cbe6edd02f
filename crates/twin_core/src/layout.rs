//! Validated plant layout: content plus the static vehicle route table.

use std::collections::{HashMap, HashSet};

use crate::{PlantContent, Route, StationId, StationKind, VehicleId};

/// Shortest station tick a layout may declare.
pub const MIN_TICK_SECONDS: f64 = 1e-6;

/// Authoring errors caught when a layout is loaded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("duplicate station id '{0}'")]
    DuplicateStation(StationId),

    #[error("duplicate vehicle id '{0}'")]
    DuplicateVehicle(VehicleId),

    #[error("vehicle '{vehicle}' route references unknown station '{station}'")]
    UnknownRouteStation {
        vehicle: VehicleId,
        station: StationId,
    },

    #[error("transfer route references unknown station '{0}'")]
    UnknownTransferStation(StationId),

    #[error("pump '{pump}' cannot feed pump station '{target}'")]
    PumpFeedsPump { pump: StationId, target: StationId },

    #[error("pump '{pump}' feeds unknown station '{target}'")]
    UnknownPumpTarget { pump: StationId, target: StationId },

    #[error("station '{station}' needs an auxiliary buffer")]
    MissingAuxBuffer { station: StationId },

    #[error("vehicle '{0}' path needs at least two waypoints")]
    PathTooShort(VehicleId),

    #[error("tick_seconds must be at least {min}, got {0}", min = MIN_TICK_SECONDS)]
    TickTooShort(f64),

    #[error("{what} must be positive, got {value}")]
    NonPositive { what: String, value: f64 },
}

/// Static mapping from vehicle to its load/unload endpoints.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<VehicleId, Route>,
}

impl RouteTable {
    pub fn get(&self, vehicle_id: &VehicleId) -> Option<&Route> {
        self.routes.get(vehicle_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Content that passed validation, with its route table built once.
#[derive(Debug, Clone)]
pub struct Plant {
    pub content: PlantContent,
    pub routes: RouteTable,
}

impl Plant {
    pub fn new(content: PlantContent) -> Result<Self, LayoutError> {
        let routes = validate_layout(&content)?;
        Ok(Self { content, routes })
    }

    pub fn capacity(&self) -> f64 {
        self.content.constants.station_capacity
    }

    pub fn is_pump(&self, station_id: &StationId) -> bool {
        self.content
            .stations
            .iter()
            .any(|def| &def.id == station_id && matches!(def.kind, StationKind::Pump { .. }))
    }

    /// Sum of conversion rates over stations that turn input into output.
    pub fn nameplate_rate(&self) -> f64 {
        self.content
            .stations
            .iter()
            .filter(|def| !matches!(def.kind, StationKind::Pump { .. }))
            .map(|def| def.process_rate)
            .sum()
    }
}

fn ensure_positive(what: impl Into<String>, value: f64) -> Result<(), LayoutError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LayoutError::NonPositive {
            what: what.into(),
            value,
        })
    }
}

/// Check every cross-reference in `content` and build the route table.
pub fn validate_layout(content: &PlantContent) -> Result<RouteTable, LayoutError> {
    let c = &content.constants;
    ensure_positive("station_capacity", c.station_capacity)?;
    ensure_positive("transfer_rate", c.transfer_rate)?;
    ensure_positive("dwell_time", c.dwell_time)?;
    ensure_positive("tick_seconds", c.tick_seconds)?;
    if c.tick_seconds < MIN_TICK_SECONDS {
        return Err(LayoutError::TickTooShort(c.tick_seconds));
    }
    ensure_positive("audit_log_capacity", c.audit_log_capacity as f64)?;

    let mut station_ids: HashSet<&StationId> = HashSet::new();
    let mut with_aux: HashSet<&StationId> = HashSet::new();
    let mut pumps: HashSet<&StationId> = HashSet::new();
    for def in &content.stations {
        if !station_ids.insert(&def.id) {
            return Err(LayoutError::DuplicateStation(def.id.clone()));
        }
        ensure_positive(format!("station '{}' process_rate", def.id), def.process_rate)?;
        if def.initial.aux_level.is_some() {
            with_aux.insert(&def.id);
        }
        if matches!(def.kind, StationKind::Pump { .. }) {
            pumps.insert(&def.id);
        }
    }

    for def in &content.stations {
        match &def.kind {
            StationKind::Pump { feeds } => {
                if !station_ids.contains(feeds) {
                    return Err(LayoutError::UnknownPumpTarget {
                        pump: def.id.clone(),
                        target: feeds.clone(),
                    });
                }
                // Pump buffers sit outside the material balance.
                if pumps.contains(feeds) {
                    return Err(LayoutError::PumpFeedsPump {
                        pump: def.id.clone(),
                        target: feeds.clone(),
                    });
                }
                if !with_aux.contains(feeds) {
                    return Err(LayoutError::MissingAuxBuffer {
                        station: feeds.clone(),
                    });
                }
            }
            StationKind::DualInput { aux_ratio, .. } => {
                ensure_positive(format!("station '{}' aux_ratio", def.id), *aux_ratio)?;
                if !with_aux.contains(&def.id) {
                    return Err(LayoutError::MissingAuxBuffer {
                        station: def.id.clone(),
                    });
                }
            }
            StationKind::Converter => {}
        }
    }

    for route in &content.transfer_routes {
        for end in [&route.from, &route.to] {
            if !station_ids.contains(end) {
                return Err(LayoutError::UnknownTransferStation(end.clone()));
            }
        }
    }

    let mut routes = HashMap::new();
    for def in &content.vehicles {
        if def.path.len() < 2 {
            return Err(LayoutError::PathTooShort(def.id.clone()));
        }
        ensure_positive(format!("vehicle '{}' speed", def.id), def.speed)?;
        for end in [&def.route.source, &def.route.destination].into_iter().flatten() {
            if !station_ids.contains(end) {
                return Err(LayoutError::UnknownRouteStation {
                    vehicle: def.id.clone(),
                    station: end.clone(),
                });
            }
        }
        if routes.insert(def.id.clone(), def.route.clone()).is_some() {
            return Err(LayoutError::DuplicateVehicle(def.id.clone()));
        }
    }

    Ok(RouteTable { routes })
}
