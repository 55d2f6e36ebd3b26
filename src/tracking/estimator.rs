//! Arrival estimation over the ordered stops of the current subline.

use chrono::{DateTime, Duration, Utc};

use crate::catalog::Stop;
use crate::geo::{self, Coordinate};
use crate::tracking::messages::{
    compact_time, compact_timestamp, CapacityBlock, EstaStop, OutboundMessage, PositionBlock,
};

/// Upcoming stops reported per esta-info message.
pub const UPCOMING_WINDOW: usize = 5;

/// Index of the stop nearest to `position`, or `None` for an empty list.
pub fn closest_stop_index(position: Coordinate, stops: &[Stop]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, stop) in stops.iter().enumerate() {
        let Ok(d) = geo::distance(position, stop.position) else {
            continue;
        };
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((idx, d));
        }
    }
    best.map(|(idx, _)| idx)
}

/// The up-to-`UPCOMING_WINDOW` stops after the closest one.
pub fn upcoming_stops(stops: &[Stop], closest_idx: usize) -> &[Stop] {
    let start = (closest_idx + 1).min(stops.len());
    let end = (start + UPCOMING_WINDOW).min(stops.len());
    &stops[start..end]
}

/// Builds the esta-info message for a bus on `subline_id`. Arrival estimates
/// require forward motion; with velocity at or below zero the upcoming stops
/// are still listed but their times stay unknown.
pub fn build_esta_info(
    subline_id: i64,
    stops: &[Stop],
    position: Coordinate,
    velocity_ms: f64,
    timestamp: DateTime<Utc>,
    departure_offset: Duration,
) -> OutboundMessage {
    let upcoming = match closest_stop_index(position, stops) {
        Some(idx) => upcoming_stops(stops, idx),
        None => &[],
    };

    let esta_stops = upcoming
        .iter()
        .filter_map(|stop| {
            let distance = geo::distance(position, stop.position).ok()?;
            let arrival = estimate_arrival(timestamp, distance, velocity_ms);
            let departure = arrival.map(|t| t + departure_offset);
            Some(EstaStop {
                stop_id: stop.id,
                stop_code: stop.code.clone(),
                stop_nam: stop.name.clone(),
                arr_t: arrival.map(compact_time),
                dep_t: departure.map(compact_time),
                esta_dist: distance.round(),
                esta_time: arrival.map(compact_timestamp),
            })
        })
        .collect();

    let ts = compact_timestamp(timestamp);
    OutboundMessage::EstaInfo {
        rt_id: subline_id,
        upd: ts.clone(),
        date: ts,
        stops: esta_stops,
        pos: PositionBlock::new(position, velocity_ms, timestamp),
        bus: CapacityBlock::default(),
    }
}

fn estimate_arrival(
    now: DateTime<Utc>,
    distance_meters: f64,
    velocity_ms: f64,
) -> Option<DateTime<Utc>> {
    if velocity_ms <= 0.0 {
        return None;
    }
    let eta_ms = (distance_meters / velocity_ms * 1000.0) as i64;
    now.checked_add_signed(Duration::milliseconds(eta_ms))
}
