pub mod driver_ws;
pub mod error;
pub mod health;
pub mod passenger_ws;
pub mod stations;

pub use error::{internal_error, ErrorResponse};

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::broadcast::SubscriberRegistry;
use crate::catalog::CatalogReader;
use crate::tracking::state::BusStateStore;
use crate::tracking::TrackingPipeline;

pub fn router(
    pipeline: Arc<TrackingPipeline>,
    store: Arc<BusStateStore>,
    registry: Arc<SubscriberRegistry>,
    catalog: Arc<CatalogReader>,
) -> Router {
    Router::new()
        .nest("/stations", stations::router(catalog, store.clone()))
        .nest("/health", health::router(store, registry.clone()))
        .route(
            "/driver-location-ws",
            get(driver_ws::driver_location_ws)
                .with_state(driver_ws::DriverWsState { pipeline }),
        )
        .route(
            "/passenger-realtime-ws/{main_route_id}",
            get(passenger_ws::passenger_realtime_ws)
                .with_state(passenger_ws::PassengerWsState { registry }),
        )
}
