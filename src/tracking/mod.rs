//! Telemetry pipeline: driver frames in, passenger messages out.
//!
//! Every inbound frame runs one pass: history update, route-change reset,
//! direction inference, then up to three broadcasts (close on a subline
//! transition, position, esta-info). The pass holds the bus's lock from start
//! to finish, so frames for one bus are strictly ordered while distinct buses
//! proceed in parallel, and a failure for one bus never touches another.

pub mod estimator;
pub mod matcher;
pub mod messages;
pub mod state;
pub mod station;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::broadcast::Broadcaster;
use crate::catalog::CatalogReader;
use crate::config::TrackingConfig;
use crate::geo::Coordinate;
use messages::OutboundMessage;
use state::{BusState, BusStateStore, TrackPoint};

/// A validated driver telemetry frame.
#[derive(Debug, Clone)]
pub struct DriverFrame {
    pub route_id: i64,
    pub bus_id: String,
    pub position: Coordinate,
    pub timestamp: DateTime<Utc>,
    /// m/s
    pub velocity: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    route_id: i64,
    bus_id: Option<String>,
    lat: f64,
    lng: f64,
    timestamp: Option<String>,
    velocity: f64,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing busId")]
    MissingBusId,
    #[error("invalid coordinates")]
    BadCoordinates,
}

/// Parses and validates one inbound text frame. An unparseable timestamp is
/// tolerated (the receive time stands in); missing bus ids and non-finite
/// coordinates reject the frame.
pub fn parse_frame(text: &str) -> Result<DriverFrame, FrameError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let bus_id = raw
        .bus_id
        .filter(|id| !id.is_empty())
        .ok_or(FrameError::MissingBusId)?;
    let position = Coordinate::new(raw.lat, raw.lng);
    if !position.is_finite() {
        return Err(FrameError::BadCoordinates);
    }
    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(DriverFrame {
        route_id: raw.route_id,
        bus_id,
        position,
        timestamp,
        velocity: raw.velocity,
    })
}

pub struct TrackingPipeline {
    store: Arc<BusStateStore>,
    catalog: Arc<CatalogReader>,
    broadcaster: Arc<Broadcaster>,
    config: TrackingConfig,
}

impl TrackingPipeline {
    pub fn new(
        store: Arc<BusStateStore>,
        catalog: Arc<CatalogReader>,
        broadcaster: Arc<Broadcaster>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            broadcaster,
            config,
        }
    }

    /// Runs one pipeline pass for a validated frame.
    pub async fn process_frame(&self, frame: DriverFrame) {
        let slot = self
            .store
            .entry(&frame.bus_id, frame.route_id, frame.timestamp)
            .await;
        let mut state = slot.lock().await;

        // 1. history update
        state.push_sample(
            TrackPoint {
                position: frame.position,
                timestamp: frame.timestamp,
            },
            self.config.history_size,
        );

        // 2. route change reset
        let route_changed = state.main_route_id != frame.route_id;
        if route_changed {
            state.reset_for_route(frame.route_id);
        }

        // 3. subline inference
        if !route_changed && state.history.len() >= self.config.min_signals_for_direction {
            match self.catalog.sublines_of_route(frame.route_id).await {
                Ok(sublines) if !sublines.is_empty() => {
                    let track: Vec<Coordinate> =
                        state.history.iter().map(|p| p.position).collect();
                    if let Some(subline_id) =
                        matcher::match_direction(&track, &sublines, &self.config)
                    {
                        state.current_subline_id = Some(subline_id);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        bus_id = %frame.bus_id,
                        error = %e,
                        "catalog unavailable, skipping direction match"
                    );
                }
            }
        }

        // 4. close on subline transition
        if let (Some(previous), Some(current)) =
            (state.previous_subline_id, state.current_subline_id)
        {
            if previous != current {
                let departed_at = state
                    .history
                    .iter()
                    .rev()
                    .nth(1)
                    .cloned()
                    .unwrap_or_else(|| TrackPoint {
                        position: frame.position,
                        timestamp: frame.timestamp,
                    });
                let close =
                    OutboundMessage::close(previous, departed_at.position, departed_at.timestamp);
                self.broadcaster.broadcast(&close).await;
            }
        }

        // 5. position
        if let Some(subline_id) = state.current_subline_id {
            let position = OutboundMessage::position(
                subline_id,
                frame.position,
                frame.velocity,
                frame.timestamp,
            );
            self.broadcaster.broadcast(&position).await;
        }

        // 6. esta-info
        if let Some(subline_id) = state.current_subline_id {
            self.refresh_cached_stops(&mut state, subline_id).await;
            if let Some((_, stops)) = state.cached_stops.clone() {
                let esta = estimator::build_esta_info(
                    subline_id,
                    &stops,
                    frame.position,
                    frame.velocity,
                    frame.timestamp,
                    Duration::seconds(self.config.stop_departure_offset_secs as i64),
                );
                self.broadcaster.broadcast(&esta).await;
            }
        }

        // 7. commit
        state.previous_subline_id = state.current_subline_id;
        state.last_timestamp = frame.timestamp;
        state.last_velocity = frame.velocity;
    }

    async fn refresh_cached_stops(&self, state: &mut BusState, subline_id: i64) {
        if state
            .cached_stops
            .as_ref()
            .is_some_and(|(cached_id, _)| *cached_id == subline_id)
        {
            return;
        }
        match self.catalog.sublines_of_route(state.main_route_id).await {
            Ok(sublines) => {
                state.cached_stops = sublines
                    .get(&subline_id)
                    .map(|stops| (subline_id, stops.clone()));
            }
            Err(e) => {
                warn!(
                    subline_id,
                    error = %e,
                    "catalog unavailable, skipping arrival estimates"
                );
                state.cached_stops = None;
            }
        }
    }
}
