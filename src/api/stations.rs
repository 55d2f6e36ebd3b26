use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::{internal_error, ErrorResponse};
use crate::catalog::CatalogReader;
use crate::tracking::state::BusStateStore;
use crate::tracking::station::{self, DepartureHint};

const DEFAULT_LIMIT: usize = 10;

#[derive(Clone)]
pub struct StationsState {
    pub catalog: Arc<CatalogReader>,
    pub store: Arc<BusStateStore>,
}

#[derive(Debug, Deserialize)]
pub struct DeparturesQuery {
    pub limit: Option<usize>,
}

/// One bus approaching the queried station.
#[derive(Debug, Serialize, ToSchema)]
pub struct DepartureHintDto {
    pub subline_id: i64,
    pub bus_id: String,
    pub lat: f64,
    pub lng: f64,
    /// Current velocity in m/s
    pub velocity: f64,
    /// Estimated arrival at the station (RFC 3339); null when the bus is not
    /// moving fast enough to estimate
    pub estimated_arrival: Option<String>,
    /// Straight-line distance to the station in meters
    pub distance_meters: f64,
}

impl From<DepartureHint> for DepartureHintDto {
    fn from(hint: DepartureHint) -> Self {
        Self {
            subline_id: hint.subline_id,
            bus_id: hint.bus_id,
            lat: hint.current_pos.lat,
            lng: hint.current_pos.lng,
            velocity: hint.current_velocity,
            estimated_arrival: hint.estimated_arrival.map(|t| t.to_rfc3339()),
            distance_meters: hint.distance_meters,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StationDeparturesResponse {
    pub station_id: i64,
    pub departures: Vec<DepartureHintDto>,
}

/// Buses currently approaching a station, soonest first
#[utoipa::path(
    get,
    path = "/api/stations/{station_id}/departures",
    params(
        ("station_id" = i64, Path, description = "Stop id of the target station"),
        ("limit" = Option<usize>, Query, description = "Maximum number of hints (default 10)")
    ),
    responses(
        (status = 200, description = "Approaching buses, soonest first", body = StationDeparturesResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "stations"
)]
pub async fn station_departures(
    Path(station_id): Path<i64>,
    Query(query): Query<DeparturesQuery>,
    State(state): State<StationsState>,
) -> Result<Json<StationDeparturesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let hints = station::departures_for_station(&state.catalog, &state.store, station_id, limit)
        .await
        .map_err(|e| internal_error(format!("Catalog error: {e}")))?;

    Ok(Json(StationDeparturesResponse {
        station_id,
        departures: hints.into_iter().map(DepartureHintDto::from).collect(),
    }))
}

pub fn router(catalog: Arc<CatalogReader>, store: Arc<BusStateStore>) -> Router {
    let state = StationsState { catalog, store };
    Router::new()
        .route("/{station_id}/departures", get(station_departures))
        .with_state(state)
}
