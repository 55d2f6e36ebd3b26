//! Read-only catalog queries for sublines and their ordered stops.
//!
//! Sublines change when operators publish new route variants, which happens
//! rarely; lookups are cached with a TTL and served stale in between. Every
//! query runs under a bounded deadline so a stalled database never wedges the
//! telemetry pipeline.

use sqlx::{FromRow, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::CatalogConfig;
use crate::geo::Coordinate;

/// A catalog stop. Immutable within a process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub ref_code: String,
    pub position: Coordinate,
}

/// Ordered stops of one subline; stop N+1 is the immediate successor of
/// stop N along the drive path.
pub type SublineStops = Arc<Vec<Stop>>;

/// All sublines of a main route, keyed by subline id. BTreeMap so iteration
/// is by ascending id (matcher tie-breaks depend on this).
pub type RouteSublines = Arc<BTreeMap<i64, SublineStops>>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("catalog query timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, FromRow)]
struct SublineStopRow {
    subline_id: i64,
    stop_id: i64,
    code: String,
    name: String,
    ref_code: String,
    lat: f64,
    lng: f64,
}

#[derive(Debug, FromRow)]
struct StopRow {
    stop_id: i64,
    code: String,
    name: String,
    ref_code: String,
    lat: f64,
    lng: f64,
}

pub struct CatalogReader {
    pool: SqlitePool,
    ttl: Duration,
    query_timeout: Duration,
    route_cache: RwLock<HashMap<i64, (Instant, RouteSublines)>>,
    owner_cache: RwLock<HashMap<i64, (Instant, Option<i64>)>>,
}

impl CatalogReader {
    pub fn new(pool: SqlitePool, config: &CatalogConfig) -> Self {
        Self {
            pool,
            ttl: Duration::from_secs(config.ttl_secs),
            query_timeout: Duration::from_secs(config.timeout_secs),
            route_cache: RwLock::new(HashMap::new()),
            owner_cache: RwLock::new(HashMap::new()),
        }
    }

    /// All sublines of a main route with their ordered stops. Empty map when
    /// the route has no sublines.
    pub async fn sublines_of_route(
        &self,
        main_route_id: i64,
    ) -> Result<RouteSublines, CatalogError> {
        {
            let cache = self.route_cache.read().await;
            if let Some((fetched_at, sublines)) = cache.get(&main_route_id) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(sublines.clone());
                }
            }
        }

        let rows: Vec<SublineStopRow> = self
            .with_deadline(
                sqlx::query_as(
                    r#"
                    SELECT
                        sl.id as subline_id,
                        s.id as stop_id,
                        s.code,
                        s.name,
                        s.ref_code,
                        s.lat,
                        s.lng
                    FROM sublines sl
                    JOIN subline_stops ss ON ss.subline_id = sl.id
                    JOIN stops s ON s.id = ss.stop_id
                    WHERE sl.main_route_id = ?
                    ORDER BY sl.id, ss.sequence
                    "#,
                )
                .bind(main_route_id)
                .fetch_all(&self.pool),
            )
            .await?;

        let mut grouped: BTreeMap<i64, Vec<Stop>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.subline_id).or_default().push(Stop {
                id: row.stop_id,
                code: row.code,
                name: row.name,
                ref_code: row.ref_code,
                position: Coordinate::new(row.lat, row.lng),
            });
        }
        let sublines: RouteSublines = Arc::new(
            grouped
                .into_iter()
                .map(|(id, stops)| (id, Arc::new(stops)))
                .collect(),
        );

        self.route_cache
            .write()
            .await
            .insert(main_route_id, (Instant::now(), sublines.clone()));

        Ok(sublines)
    }

    /// The main route a subline belongs to; `None` for unknown subline ids.
    pub async fn owning_route_of(&self, subline_id: i64) -> Result<Option<i64>, CatalogError> {
        {
            let cache = self.owner_cache.read().await;
            if let Some((fetched_at, owner)) = cache.get(&subline_id) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(*owner);
                }
            }
        }

        let owner: Option<i64> = self
            .with_deadline(
                sqlx::query_scalar("SELECT main_route_id FROM sublines WHERE id = ?")
                    .bind(subline_id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        self.owner_cache
            .write()
            .await
            .insert(subline_id, (Instant::now(), owner));

        Ok(owner)
    }

    /// Ids of all sublines whose stop sequence visits the given station.
    pub async fn sublines_serving_station(
        &self,
        station_id: i64,
    ) -> Result<Vec<i64>, CatalogError> {
        let ids: Vec<i64> = self
            .with_deadline(
                sqlx::query_scalar(
                    "SELECT DISTINCT subline_id FROM subline_stops WHERE stop_id = ? ORDER BY subline_id",
                )
                .bind(station_id)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(ids)
    }

    /// Ordered stops of a single subline; `None` when the subline has no stops.
    pub async fn stops_of_subline(
        &self,
        subline_id: i64,
    ) -> Result<Option<SublineStops>, CatalogError> {
        let rows: Vec<StopRow> = self
            .with_deadline(
                sqlx::query_as(
                    r#"
                    SELECT
                        s.id as stop_id,
                        s.code,
                        s.name,
                        s.ref_code,
                        s.lat,
                        s.lng
                    FROM subline_stops ss
                    JOIN stops s ON s.id = ss.stop_id
                    WHERE ss.subline_id = ?
                    ORDER BY ss.sequence
                    "#,
                )
                .bind(subline_id)
                .fetch_all(&self.pool),
            )
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(Arc::new(
            rows.into_iter()
                .map(|row| Stop {
                    id: row.stop_id,
                    code: row.code,
                    name: row.name,
                    ref_code: row.ref_code,
                    position: Coordinate::new(row.lat, row.lng),
                })
                .collect(),
        )))
    }

    async fn with_deadline<T>(
        &self,
        query: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, CatalogError> {
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CatalogError::Timeout(self.query_timeout)),
        }
    }
}
