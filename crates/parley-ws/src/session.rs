use parley_core::events::ServerEvent;

/// Per-connection state: anonymous until a register event supplies a user
/// id, plus the set of rooms this connection has subscribed to.
pub struct Session {
    pub connection_id: String,
    pub user_id: Option<i64>,
    pub room_ids: Vec<i64>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            room_ids: Vec::new(),
        }
    }

    pub fn is_registered_as(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }

    /// Subscribe this connection to a room's broadcast group.
    pub fn join_room(&mut self, room_id: i64) {
        if !self.room_ids.contains(&room_id) {
            self.room_ids.push(room_id);
        }
    }

    pub fn should_receive_event(&self, event: &ServerEvent) -> bool {
        // Events targeting specific connections go only to them.
        if let Some(targets) = &event.target_connection_ids {
            return targets.contains(&self.connection_id);
        }
        match event.room_id {
            // Presence transitions and other global events reach everyone.
            None => true,
            Some(room_id) => {
                self.room_ids.contains(&room_id)
                    || event.echo_connection_id.as_deref() == Some(&self.connection_id)
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
