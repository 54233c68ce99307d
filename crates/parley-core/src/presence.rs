use crate::events::EventBus;
use parley_models::gateway::EVENT_USER_ONLINE_STATUS;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide map from user id to the set of that user's live connection
/// handles. A user appears in the map iff the set is non-empty. Online and
/// offline transitions are broadcast while the write guard is still held, so
/// no other task can observe the mutated map before the event is queued.
#[derive(Clone)]
pub struct PresenceRegistry {
    connections: Arc<RwLock<HashMap<i64, HashSet<String>>>>,
    bus: EventBus,
}

impl PresenceRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            bus,
        }
    }

    /// Add a connection handle for a user. Broadcasts
    /// `userOnlineStatus {userId, status: "online"}` to every connection when
    /// this is the user's first one.
    pub async fn register(&self, user_id: i64, connection_id: &str) {
        let mut map = self.connections.write().await;
        let handles = map.entry(user_id).or_default();
        let first = handles.is_empty();
        handles.insert(connection_id.to_string());
        if first {
            self.broadcast_status(user_id, "online");
        }
    }

    /// Remove a connection handle. Idempotent no-op on unknown keys. Deletes
    /// the entry and broadcasts "offline" when the last handle goes away.
    pub async fn unregister(&self, user_id: i64, connection_id: &str) {
        let mut map = self.connections.write().await;
        let Some(handles) = map.get_mut(&user_id) else {
            return;
        };
        handles.remove(connection_id);
        if handles.is_empty() {
            map.remove(&user_id);
            self.broadcast_status(user_id, "offline");
        }
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.connections
            .read()
            .await
            .get(&user_id)
            .is_some_and(|handles| !handles.is_empty())
    }

    /// True when any of `user_ids` other than `except` has a live connection.
    /// Delivery-status computation reads this; staleness at await points is
    /// acceptable (status is best-effort).
    pub async fn any_online_except(&self, user_ids: &[i64], except: i64) -> bool {
        let map = self.connections.read().await;
        user_ids
            .iter()
            .filter(|&&id| id != except)
            .any(|id| map.get(id).is_some_and(|handles| !handles.is_empty()))
    }

    fn broadcast_status(&self, user_id: i64, status: &str) {
        self.bus.dispatch(
            EVENT_USER_ONLINE_STATUS,
            json!({
                "userId": user_id.to_string(),
                "status": status,
            }),
            None,
        );
    }
}
