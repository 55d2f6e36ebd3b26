//! Direction inference: which subline of a main route is a bus driving?
//!
//! A coarse but cheap map-matching heuristic. The bus's average bearing over
//! its recent track is compared against the bearing of every adjacent stop
//! pair of every candidate subline; the segment closest in angle wins its
//! subline, as long as it deviates no more than the configured threshold.
//! A bus heading east on a route whose outbound variant trends east and whose
//! return variant trends west picks the outbound variant decisively, while
//! the threshold tolerates GPS jitter and street-grid detours.

use std::collections::BTreeMap;

use crate::catalog::SublineStops;
use crate::config::TrackingConfig;
use crate::geo::{self, Coordinate};

/// Best-matching subline id for the given track, or `None` when no segment of
/// any subline lies within the angular threshold (or the track has no usable
/// bearing). Ties keep the first candidate: sublines iterate by ascending id,
/// segments in stop order, and only a strictly better score replaces the best.
pub fn match_direction(
    track: &[Coordinate],
    sublines: &BTreeMap<i64, SublineStops>,
    config: &TrackingConfig,
) -> Option<i64> {
    let heading = geo::average_bearing(track, config.min_movement_threshold_meters)?;

    let mut best: Option<(i64, f64)> = None;
    for (&subline_id, stops) in sublines.iter() {
        if stops.len() < 2 {
            continue;
        }
        for pair in stops.windows(2) {
            let Some(segment_bearing) = geo::bearing(pair[0].position, pair[1].position) else {
                continue;
            };
            let delta = geo::circular_delta(heading, segment_bearing);
            if delta > config.direction_match_threshold_degrees {
                continue;
            }
            let score = config.direction_match_threshold_degrees - delta;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((subline_id, score));
            }
        }
    }

    best.map(|(subline_id, _)| subline_id)
}
