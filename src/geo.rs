//! Geodesic helpers for GPS track processing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("non-finite coordinate")]
    BadInput,
}

/// Haversine great-circle distance in meters.
pub fn distance(a: Coordinate, b: Coordinate) -> Result<f64, GeoError> {
    if !a.is_finite() || !b.is_finite() {
        return Err(GeoError::BadInput);
    }

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    Ok(EARTH_RADIUS_METERS * c)
}

/// Initial forward azimuth from `a` to `b`, in degrees normalized to [0, 360).
pub fn bearing(a: Coordinate, b: Coordinate) -> Option<f64> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let y = delta_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    Some(normalize_degrees(y.atan2(x).to_degrees()))
}

/// Circular mean of the bearings along a track, in degrees normalized to
/// [0, 360). Adjacent pairs closer than `min_segment_meters` carry no usable
/// bearing and are skipped; returns `None` when no qualifying segment remains.
///
/// An arithmetic mean is wrong across the 0/360 seam (350 and 10 average to
/// 180); summing unit vectors and taking atan2 is not.
pub fn average_bearing(points: &[Coordinate], min_segment_meters: f64) -> Option<f64> {
    let mut sum_cos = 0.0;
    let mut sum_sin = 0.0;
    let mut segments = 0usize;

    for pair in points.windows(2) {
        let Ok(d) = distance(pair[0], pair[1]) else {
            continue;
        };
        if d < min_segment_meters {
            continue;
        }
        let Some(theta) = bearing(pair[0], pair[1]) else {
            continue;
        };
        let theta = theta.to_radians();
        sum_cos += theta.cos();
        sum_sin += theta.sin();
        segments += 1;
    }

    if segments == 0 {
        return None;
    }

    Some(normalize_degrees(sum_sin.atan2(sum_cos).to_degrees()))
}

/// Shortest angular distance between two bearings, in [0, 180].
pub fn circular_delta(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    diff.min(360.0 - diff)
}

fn normalize_degrees(deg: f64) -> f64 {
    let d = deg % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ~111.2 km per degree of latitude (and of longitude at the equator)
    const METERS_PER_DEGREE: f64 = 111_194.9;

    #[test]
    fn distance_one_degree_along_equator() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let d = distance(a, b).unwrap();
        assert!((d - METERS_PER_DEGREE).abs() < 10.0, "got {d}");
    }

    #[test]
    fn distance_zero_for_identical_points() {
        let a = Coordinate::new(48.37, 10.89);
        assert_eq!(distance(a, a).unwrap(), 0.0);
    }

    #[test]
    fn distance_rejects_non_finite() {
        let a = Coordinate::new(f64::NAN, 0.0);
        let b = Coordinate::new(0.0, 0.0);
        assert!(distance(a, b).is_err());
        assert!(distance(b, a).is_err());
        assert!(distance(Coordinate::new(0.0, f64::INFINITY), b).is_err());
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!((bearing(origin, Coordinate::new(1.0, 0.0)).unwrap() - 0.0).abs() < 1e-9);
        assert!((bearing(origin, Coordinate::new(0.0, 1.0)).unwrap() - 90.0).abs() < 1e-9);
        assert!((bearing(origin, Coordinate::new(-1.0, 0.0)).unwrap() - 180.0).abs() < 1e-9);
        assert!((bearing(origin, Coordinate::new(0.0, -1.0)).unwrap() - 270.0).abs() < 1e-9);
    }

    #[test]
    fn bearing_none_for_non_finite() {
        let a = Coordinate::new(0.0, f64::NAN);
        let b = Coordinate::new(0.0, 0.0);
        assert!(bearing(a, b).is_none());
        assert!(bearing(b, a).is_none());
    }

    #[test]
    fn reciprocal_bearings_differ_by_180() {
        let a = Coordinate::new(48.37, 10.89);
        let b = Coordinate::new(48.41, 10.95);
        let forward = bearing(a, b).unwrap();
        let back = bearing(b, a).unwrap();
        let delta = circular_delta(forward, back);
        assert!((delta - 180.0).abs() < 0.1, "forward {forward} back {back}");
    }

    #[test]
    fn average_bearing_none_below_noise_floor() {
        // all consecutive hops ~0.5 m, below the 1.0 m floor
        let step = 0.5 / METERS_PER_DEGREE;
        let points = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(step, 0.0),
            Coordinate::new(2.0 * step, 0.0),
        ];
        assert!(average_bearing(&points, 1.0).is_none());
    }

    #[test]
    fn average_bearing_none_for_single_point() {
        assert!(average_bearing(&[Coordinate::new(0.0, 0.0)], 1.0).is_none());
        assert!(average_bearing(&[], 1.0).is_none());
    }

    #[test]
    fn average_bearing_crosses_north_seam() {
        // two legs heading roughly 350 and 10 degrees: mean must be ~0/360,
        // never the arithmetic 180
        let scale = 0.001;
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(
            a.lat + scale * 350f64.to_radians().cos(),
            a.lng + scale * 350f64.to_radians().sin(),
        );
        let c = Coordinate::new(
            b.lat + scale * 10f64.to_radians().cos(),
            b.lng + scale * 10f64.to_radians().sin(),
        );
        let mean = average_bearing(&[a, b, c], 1.0).unwrap();
        assert!(circular_delta(mean, 0.0) < 0.5, "got {mean}");
    }

    #[test]
    fn average_bearing_straight_east() {
        let points = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.001),
            Coordinate::new(0.0, 0.002),
        ];
        let mean = average_bearing(&points, 1.0).unwrap();
        assert!((mean - 90.0).abs() < 0.01, "got {mean}");
    }

    #[test]
    fn circular_delta_shortest_arc() {
        assert_eq!(circular_delta(10.0, 350.0), 20.0);
        assert_eq!(circular_delta(350.0, 10.0), 20.0);
        assert_eq!(circular_delta(90.0, 270.0), 180.0);
        assert_eq!(circular_delta(45.0, 45.0), 0.0);
    }
}
