//! Outbound wire messages for passenger subscribers.
//!
//! The `rt_id` on the wire is always a subline id. Timestamps in `upd`,
//! `date` and `esta_time` use the compact 14-digit `YYYYMMDDHHMMSS` UTC form;
//! `arr_t`/`dep_t` carry `HHMMSS`. Unknown estimates serialize as null.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geo::Coordinate;

const MS_TO_KMH: f64 = 3.6;

/// Telemetry-derived message fanned out to the subscribers of one main route.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    Position {
        rt_id: i64,
        upd: String,
        date: String,
        lat: f64,
        lng: f64,
        /// km/h
        vel: f64,
    },
    /// A bus departed from a previously tracked subline; passenger clients
    /// retire its trajectory.
    Close {
        rt_id: i64,
        upd: String,
        date: String,
        del: i64,
        pass: String,
        lat: f64,
        lng: f64,
        stop_id: i64,
        stop_code: String,
        stop_nam: String,
    },
    EstaInfo {
        rt_id: i64,
        upd: String,
        date: String,
        stops: Vec<EstaStop>,
        pos: PositionBlock,
        bus: CapacityBlock,
    },
}

impl OutboundMessage {
    /// The subline the message refers to, used to resolve the target route.
    pub fn subline_id(&self) -> i64 {
        match self {
            OutboundMessage::Position { rt_id, .. }
            | OutboundMessage::Close { rt_id, .. }
            | OutboundMessage::EstaInfo { rt_id, .. } => *rt_id,
        }
    }

    pub fn position(
        subline_id: i64,
        position: Coordinate,
        velocity_ms: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let ts = compact_timestamp(timestamp);
        OutboundMessage::Position {
            rt_id: subline_id,
            upd: ts.clone(),
            date: ts,
            lat: position.lat,
            lng: position.lng,
            vel: velocity_ms * MS_TO_KMH,
        }
    }

    pub fn close(subline_id: i64, position: Coordinate, timestamp: DateTime<Utc>) -> Self {
        let ts = compact_timestamp(timestamp);
        OutboundMessage::Close {
            rt_id: subline_id,
            upd: ts.clone(),
            date: ts,
            del: 0,
            pass: "0".to_string(),
            lat: position.lat,
            lng: position.lng,
            stop_id: 0,
            stop_code: "-".to_string(),
            stop_nam: "-".to_string(),
        }
    }
}

/// One upcoming stop inside an esta-info message.
#[derive(Debug, Clone, Serialize)]
pub struct EstaStop {
    pub stop_id: i64,
    pub stop_code: String,
    pub stop_nam: String,
    /// Estimated arrival, `HHMMSS`; null when the bus is not moving.
    pub arr_t: Option<String>,
    /// Estimated departure (arrival plus the configured dwell offset).
    pub dep_t: Option<String>,
    /// Straight-line distance to the stop in meters.
    pub esta_dist: f64,
    /// Estimated arrival, full `YYYYMMDDHHMMSS`.
    pub esta_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionBlock {
    pub lat: f64,
    pub lng: f64,
    /// km/h
    pub vel: f64,
    pub time: String,
}

impl PositionBlock {
    pub fn new(position: Coordinate, velocity_ms: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat: position.lat,
            lng: position.lng,
            vel: velocity_ms * MS_TO_KMH,
            time: compact_timestamp(timestamp),
        }
    }
}

/// Static placeholder capacity block; a forward-compatible shape until buses
/// report real passenger counts.
#[derive(Debug, Clone, Serialize)]
pub struct CapacityBlock {
    pub pas: u32,
    pub cap: u32,
    pub cap_seated: u32,
    pub cap_standing: u32,
}

impl Default for CapacityBlock {
    fn default() -> Self {
        Self {
            pas: 0,
            cap: 50,
            cap_seated: 30,
            cap_standing: 20,
        }
    }
}

/// 14-digit `YYYYMMDDHHMMSS`, UTC.
pub fn compact_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%S").to_string()
}

/// 6-digit `HHMMSS`, UTC.
pub fn compact_time(ts: DateTime<Utc>) -> String {
    ts.format("%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 34, 56).unwrap()
    }

    fn keys_of(value: &serde_json::Value) -> Vec<&str> {
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn compact_forms() {
        assert_eq!(compact_timestamp(ts()), "20260801123456");
        assert_eq!(compact_time(ts()), "123456");
    }

    #[test]
    fn position_wire_shape() {
        let msg = OutboundMessage::position(1011, Coordinate::new(48.37, 10.89), 10.0, ts());
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "position");
        assert_eq!(value["rt_id"], 1011);
        assert_eq!(value["upd"], "20260801123456");
        assert_eq!(value["date"], "20260801123456");
        assert_eq!(value["lat"], 48.37);
        assert_eq!(value["lng"], 10.89);
        assert_eq!(value["vel"], 36.0);
        assert_eq!(
            keys_of(&value),
            vec!["date", "lat", "lng", "rt_id", "type", "upd", "vel"]
        );
    }

    #[test]
    fn close_wire_shape() {
        let msg = OutboundMessage::close(1011, Coordinate::new(48.37, 10.89), ts());
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "close");
        assert_eq!(value["rt_id"], 1011);
        assert_eq!(value["del"], 0);
        assert_eq!(value["pass"], "0");
        assert_eq!(value["stop_id"], 0);
        assert_eq!(value["stop_code"], "-");
        assert_eq!(value["stop_nam"], "-");
        assert_eq!(
            keys_of(&value),
            vec![
                "date", "del", "lat", "lng", "pass", "rt_id", "stop_code", "stop_id", "stop_nam",
                "type", "upd"
            ]
        );
    }

    #[test]
    fn esta_info_wire_shape() {
        let msg = OutboundMessage::EstaInfo {
            rt_id: 1011,
            upd: compact_timestamp(ts()),
            date: compact_timestamp(ts()),
            stops: vec![EstaStop {
                stop_id: 7,
                stop_code: "C7".into(),
                stop_nam: "Stop 7".into(),
                arr_t: Some("123556".into()),
                dep_t: Some("123626".into()),
                esta_dist: 600.0,
                esta_time: Some("20260801123556".into()),
            }],
            pos: PositionBlock::new(Coordinate::new(48.37, 10.89), 10.0, ts()),
            bus: CapacityBlock::default(),
        };
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "esta-info");
        assert_eq!(
            keys_of(&value),
            vec!["bus", "date", "pos", "rt_id", "stops", "type", "upd"]
        );
        assert_eq!(
            keys_of(&value["stops"][0]),
            vec![
                "arr_t", "dep_t", "esta_dist", "esta_time", "stop_code", "stop_id", "stop_nam"
            ]
        );
        assert_eq!(keys_of(&value["pos"]), vec!["lat", "lng", "time", "vel"]);
        assert_eq!(
            keys_of(&value["bus"]),
            vec!["cap", "cap_seated", "cap_standing", "pas"]
        );
        assert_eq!(value["bus"]["pas"], 0);
        assert_eq!(value["bus"]["cap"], 50);
        assert_eq!(value["bus"]["cap_seated"], 30);
        assert_eq!(value["bus"]["cap_standing"], 20);
    }

    #[test]
    fn unknown_estimates_serialize_as_null() {
        let stop = EstaStop {
            stop_id: 7,
            stop_code: "C7".into(),
            stop_nam: "Stop 7".into(),
            arr_t: None,
            dep_t: None,
            esta_dist: 600.0,
            esta_time: None,
        };
        let value = serde_json::to_value(&stop).unwrap();
        assert!(value["arr_t"].is_null());
        assert!(value["dep_t"].is_null());
        assert!(value["esta_time"].is_null());
    }
}
