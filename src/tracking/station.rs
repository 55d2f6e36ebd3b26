//! Station-directed read path: which buses are approaching a station next?

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

use crate::catalog::{CatalogError, CatalogReader, SublineStops};
use crate::geo::{self, Coordinate};
use crate::tracking::estimator;
use crate::tracking::state::BusStateStore;

/// Below this speed an arrival time is unknowable; the hint still lists the
/// bus, sorted after every timed one.
const MIN_ESTIMATE_VELOCITY_MS: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct DepartureHint {
    pub subline_id: i64,
    pub bus_id: String,
    pub current_pos: Coordinate,
    /// m/s
    pub current_velocity: f64,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub distance_meters: f64,
}

/// Active buses approaching `station_id`, soonest first, at most `limit`.
/// Buses whose closest stop is at or past the station are omitted.
pub async fn departures_for_station(
    catalog: &CatalogReader,
    store: &BusStateStore,
    station_id: i64,
    limit: usize,
) -> Result<Vec<DepartureHint>, CatalogError> {
    let subline_ids = catalog.sublines_serving_station(station_id).await?;
    if subline_ids.is_empty() {
        return Ok(Vec::new());
    }

    let serving: HashSet<i64> = subline_ids.iter().copied().collect();
    let mut stop_lists: HashMap<i64, SublineStops> = HashMap::new();
    for subline_id in &subline_ids {
        if let Some(stops) = catalog.stops_of_subline(*subline_id).await? {
            stop_lists.insert(*subline_id, stops);
        }
    }

    let now = Utc::now();
    let mut timed: Vec<(f64, DepartureHint)> = Vec::new();

    for (bus_id, state) in store.snapshot().await {
        let Some(subline_id) = state.current_subline_id else {
            continue;
        };
        if !serving.contains(&subline_id) {
            continue;
        }
        let Some(stops) = stop_lists.get(&subline_id) else {
            continue;
        };
        let Some(latest) = state.history.back() else {
            continue;
        };
        let Some(closest_idx) = estimator::closest_stop_index(latest.position, stops) else {
            continue;
        };
        let Some(station_idx) = stops.iter().position(|s| s.id == station_id) else {
            continue;
        };
        if station_idx <= closest_idx {
            // already at or past the station
            continue;
        }
        let Ok(distance) = geo::distance(latest.position, stops[station_idx].position) else {
            continue;
        };

        let (eta_secs, estimated_arrival) = if state.last_velocity > MIN_ESTIMATE_VELOCITY_MS {
            let secs = distance / state.last_velocity;
            (
                secs,
                now.checked_add_signed(Duration::milliseconds((secs * 1000.0) as i64)),
            )
        } else {
            (f64::INFINITY, None)
        };

        timed.push((
            eta_secs,
            DepartureHint {
                subline_id,
                bus_id,
                current_pos: latest.position,
                current_velocity: state.last_velocity,
                estimated_arrival,
                distance_meters: distance,
            },
        ));
    }

    timed.sort_by(|a, b| a.0.total_cmp(&b.0));
    timed.truncate(limit);

    Ok(timed.into_iter().map(|(_, hint)| hint).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::tracking::state::TrackPoint;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Route 101, subline 1011: eight stops (ids 1..=8) ~1.1 km apart along
    /// the equator.
    async fn fixture() -> (CatalogReader, SqlitePool) {
        let pool: SqlitePool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        sqlx::query("INSERT INTO sublines (id, main_route_id) VALUES (1011, 101)")
            .execute(&pool)
            .await
            .unwrap();
        for i in 0..8i64 {
            sqlx::query(
                "INSERT INTO stops (id, code, name, ref_code, lat, lng) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(i + 1)
            .bind(format!("C{}", i + 1))
            .bind(format!("Stop {}", i + 1))
            .bind(format!("R{}", i + 1))
            .bind(0.0)
            .bind(i as f64 * 0.01)
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO subline_stops (subline_id, stop_id, sequence) VALUES (1011, ?, ?)",
            )
            .bind(i + 1)
            .bind(i)
            .execute(&pool)
            .await
            .unwrap();
        }

        let catalog = CatalogReader::new(pool.clone(), &CatalogConfig::default());
        (catalog, pool)
    }

    async fn place_bus(
        store: &BusStateStore,
        bus_id: &str,
        subline_id: Option<i64>,
        lng: f64,
        velocity: f64,
    ) {
        let ts = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let slot = store.entry(bus_id, 101, ts).await;
        let mut state = slot.lock().await;
        state.push_sample(
            TrackPoint {
                position: Coordinate::new(0.0, lng),
                timestamp: ts,
            },
            5,
        );
        state.current_subline_id = subline_id;
        state.previous_subline_id = subline_id;
        state.last_velocity = velocity;
    }

    #[tokio::test]
    async fn approaching_bus_is_hinted_and_passed_bus_is_skipped() {
        let (catalog, _pool) = fixture().await;
        let store = BusStateStore::new();

        // B1 sits at stop index 2, moving; station is stop id 6 (index 5)
        place_bus(&store, "B1", Some(1011), 0.02, 10.0).await;
        // B2 is already at index 7, past the station
        place_bus(&store, "B2", Some(1011), 0.07, 10.0).await;

        let hints = departures_for_station(&catalog, &store, 6, 10)
            .await
            .unwrap();
        assert_eq!(hints.len(), 1);

        let hint = &hints[0];
        assert_eq!(hint.bus_id, "B1");
        assert_eq!(hint.subline_id, 1011);
        assert_eq!(hint.current_velocity, 10.0);

        // three ~1.1 km hops ahead at 10 m/s
        let expected = geo::distance(
            Coordinate::new(0.0, 0.02),
            Coordinate::new(0.0, 0.05),
        )
        .unwrap();
        assert!((hint.distance_meters - expected).abs() < 1.0);
        let eta = (hint.estimated_arrival.unwrap() - Utc::now()).num_seconds();
        let expected_eta = (expected / 10.0) as i64;
        assert!((eta - expected_eta).abs() <= 2, "eta {eta}s");
    }

    #[tokio::test]
    async fn crawling_bus_sorts_last_with_unknown_arrival() {
        let (catalog, _pool) = fixture().await;
        let store = BusStateStore::new();

        place_bus(&store, "fast", Some(1011), 0.02, 10.0).await;
        place_bus(&store, "crawler", Some(1011), 0.01, 0.3).await;

        let hints = departures_for_station(&catalog, &store, 6, 10)
            .await
            .unwrap();
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].bus_id, "fast");
        assert_eq!(hints[1].bus_id, "crawler");
        assert!(hints[1].estimated_arrival.is_none());
    }

    #[tokio::test]
    async fn limit_truncates_after_sorting() {
        let (catalog, _pool) = fixture().await;
        let store = BusStateStore::new();

        place_bus(&store, "near", Some(1011), 0.04, 10.0).await;
        place_bus(&store, "far", Some(1011), 0.00, 10.0).await;

        let hints = departures_for_station(&catalog, &store, 6, 1).await.unwrap();
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].bus_id, "near");
    }

    #[tokio::test]
    async fn buses_without_a_subline_are_ignored() {
        let (catalog, _pool) = fixture().await;
        let store = BusStateStore::new();

        place_bus(&store, "lost", None, 0.02, 10.0).await;

        let hints = departures_for_station(&catalog, &store, 6, 10)
            .await
            .unwrap();
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn unknown_station_yields_no_hints() {
        let (catalog, _pool) = fixture().await;
        let store = BusStateStore::new();
        place_bus(&store, "B1", Some(1011), 0.02, 10.0).await;

        let hints = departures_for_station(&catalog, &store, 999, 10)
            .await
            .unwrap();
        assert!(hints.is_empty());
    }
}
