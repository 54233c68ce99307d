use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Room whose subscribed connections should receive this event.
    pub room_id: Option<i64>,
    /// When set, deliver only to these connection handles.
    pub target_connection_ids: Option<Vec<String>>,
    /// Additionally deliver to this connection even if it is not subscribed
    /// to `room_id`. Read receipts use this so every session of the reading
    /// user observes the change, not just the one that sent markAsRead.
    pub echo_connection_id: Option<String>,
}

/// Broadcast-based event bus for real-time dispatch.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Helper: publish an event scoped to a room, or to every connection
    /// when `room_id` is `None`.
    pub fn dispatch(&self, event_type: &str, payload: serde_json::Value, room_id: Option<i64>) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            room_id,
            target_connection_ids: None,
            echo_connection_id: None,
        });
    }

    /// Helper: publish a targeted event delivered only to the given connections.
    pub fn dispatch_to_connections(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        target_connection_ids: Vec<String>,
    ) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            room_id: None,
            target_connection_ids: Some(target_connection_ids),
            echo_connection_id: None,
        });
    }

    /// Helper: publish a room event that also echoes to one extra connection.
    pub fn dispatch_with_echo(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        room_id: i64,
        echo_connection_id: &str,
    ) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            room_id: Some(room_id),
            target_connection_ids: None,
            echo_connection_id: Some(echo_connection_id.to_string()),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
