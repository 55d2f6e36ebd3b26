//! Route-partitioned subscriber registry and broadcast fan-out.
//!
//! Subscribers register per main route. The broadcaster resolves a message's
//! subline to its owning route, serializes once, and hands the frame to each
//! subscriber through a bounded per-connection queue. A full or closed queue
//! drops that subscriber; the pipeline never waits on a slow client.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::CatalogReader;
use crate::tracking::messages::OutboundMessage;

/// One registered passenger connection. Dropping the receiver (or falling
/// behind) unsubscribes it on the next broadcast touching its route.
pub struct Subscription {
    pub id: Uuid,
    pub route_id: i64,
    pub rx: mpsc::Receiver<String>,
}

pub struct SubscriberRegistry {
    routes: RwLock<HashMap<i64, HashMap<Uuid, mpsc::Sender<String>>>>,
    queue_capacity: usize,
}

impl SubscriberRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    pub async fn subscribe(&self, route_id: i64) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        self.routes
            .write()
            .await
            .entry(route_id)
            .or_default()
            .insert(id, tx);
        debug!(route_id, subscriber = %id, "subscriber joined");
        Subscription { id, route_id, rx }
    }

    /// Removes one subscriber; the route's set is reclaimed once empty.
    pub async fn unsubscribe(&self, route_id: i64, id: Uuid) {
        let mut routes = self.routes.write().await;
        if let Some(subscribers) = routes.get_mut(&route_id) {
            if subscribers.remove(&id).is_some() {
                debug!(route_id, subscriber = %id, "subscriber left");
            }
            if subscribers.is_empty() {
                routes.remove(&route_id);
            }
        }
    }

    pub async fn route_count(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn subscriber_count(&self, route_id: i64) -> usize {
        self.routes
            .read()
            .await
            .get(&route_id)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Senders for one route, cloned out so the lock is released before any
    /// queue is touched.
    async fn senders_for(&self, route_id: i64) -> Vec<(Uuid, mpsc::Sender<String>)> {
        self.routes
            .read()
            .await
            .get(&route_id)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    catalog: Arc<CatalogReader>,
    /// Subline ids already reported as unresolvable, to log each only once.
    unknown_sublines: Mutex<HashSet<i64>>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, catalog: Arc<CatalogReader>) -> Self {
        Self {
            registry,
            catalog,
            unknown_sublines: Mutex::new(HashSet::new()),
        }
    }

    /// Fans `message` out to every subscriber of the route owning its subline.
    /// Unresolvable sublines and empty subscriber sets drop the message;
    /// subscribers whose queue is full or gone are evicted.
    pub async fn broadcast(&self, message: &OutboundMessage) {
        let subline_id = message.subline_id();

        let route_id = match self.catalog.owning_route_of(subline_id).await {
            Ok(Some(route_id)) => route_id,
            Ok(None) => {
                if self.unknown_sublines.lock().await.insert(subline_id) {
                    warn!(subline_id, "dropping messages for unknown subline");
                }
                return;
            }
            Err(e) => {
                warn!(subline_id, error = %e, "could not resolve subline owner, dropping message");
                return;
            }
        };

        let senders = self.registry.senders_for(route_id).await;
        if senders.is_empty() {
            return;
        }

        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(subline_id, error = %e, "failed to serialize outbound message");
                return;
            }
        };

        let mut evicted = Vec::new();
        for (id, tx) in senders {
            if tx.try_send(frame.clone()).is_err() {
                evicted.push(id);
            }
        }
        for id in evicted {
            warn!(route_id, subscriber = %id, "evicting slow or closed subscriber");
            self.registry.unsubscribe(route_id, id).await;
        }
    }
}
