//! Per-bus in-memory tracking state.
//!
//! State is ephemeral: it is created on the first frame carrying a bus id and
//! never survives a restart. Each bus owns a mutex so frames for the same bus
//! are serialized while distinct buses process concurrently.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::catalog::SublineStops;
use crate::geo::Coordinate;

/// One GPS sample from a driver frame.
#[derive(Debug, Clone)]
pub struct TrackPoint {
    pub position: Coordinate,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BusState {
    /// Most recent samples, oldest first. Bounded by the configured history size.
    pub history: VecDeque<TrackPoint>,
    /// Route declared by the driver client on the most recent frame.
    pub main_route_id: i64,
    /// Inferred directional variant, or `None` while undecided.
    pub current_subline_id: Option<i64>,
    /// `current_subline_id` at the end of the prior pipeline pass.
    pub previous_subline_id: Option<i64>,
    /// Ordered stops of the current subline, tagged with its id so a subline
    /// change invalidates the cache.
    pub cached_stops: Option<(i64, SublineStops)>,
    pub last_timestamp: DateTime<Utc>,
    /// Velocity in m/s reported on the most recent frame.
    pub last_velocity: f64,
}

impl BusState {
    fn new(main_route_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            history: VecDeque::new(),
            main_route_id,
            current_subline_id: None,
            previous_subline_id: None,
            cached_stops: None,
            last_timestamp: timestamp,
            last_velocity: 0.0,
        }
    }

    pub fn push_sample(&mut self, point: TrackPoint, capacity: usize) {
        self.history.push_back(point);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }

    /// Applies a driver-declared route change: direction context resets and
    /// history from the previous route no longer counts toward the quorum.
    /// Only the sample that arrived with the new declaration is kept.
    pub fn reset_for_route(&mut self, new_route_id: i64) {
        self.current_subline_id = None;
        self.previous_subline_id = None;
        self.cached_stops = None;
        if self.history.len() > 1 {
            let newest = self.history.pop_back();
            self.history.clear();
            if let Some(point) = newest {
                self.history.push_back(point);
            }
        }
        self.main_route_id = new_route_id;
    }
}

/// Thread-safe bus-id → state mapping with per-bus exclusive mutation.
#[derive(Default)]
pub struct BusStateStore {
    buses: RwLock<HashMap<String, Arc<Mutex<BusState>>>>,
}

impl BusStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic get-or-create. The returned mutex, held across a pipeline pass,
    /// serializes all processing for this bus.
    pub async fn entry(
        &self,
        bus_id: &str,
        main_route_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Arc<Mutex<BusState>> {
        if let Some(slot) = self.buses.read().await.get(bus_id) {
            return slot.clone();
        }
        let mut buses = self.buses.write().await;
        buses
            .entry(bus_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BusState::new(main_route_id, timestamp))))
            .clone()
    }

    /// Snapshot of every tracked bus. Each state is cloned under its own lock,
    /// so a concurrent commit is either fully visible or not at all.
    pub async fn snapshot(&self) -> Vec<(String, BusState)> {
        let slots: Vec<(String, Arc<Mutex<BusState>>)> = self
            .buses
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut states = Vec::with_capacity(slots.len());
        for (bus_id, slot) in slots {
            let state = slot.lock().await.clone();
            states.push((bus_id, state));
        }
        states
    }

    pub async fn len(&self) -> usize {
        self.buses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buses.read().await.is_empty()
    }

    /// Drops entries whose last frame predates `cutoff`. Entries whose lock is
    /// held (a frame mid-processing) are left alone.
    pub async fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let mut buses = self.buses.write().await;
        let before = buses.len();
        buses.retain(|_, slot| match slot.try_lock() {
            Ok(state) => state.last_timestamp >= cutoff,
            Err(_) => true,
        });
        before - buses.len()
    }
}
