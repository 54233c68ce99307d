use serde::{Deserialize, Serialize};

// Client -> server events
pub const EVENT_REGISTER: &str = "register";
pub const EVENT_JOIN_ROOM: &str = "joinRoom";
pub const EVENT_CHAT_MESSAGE: &str = "chatMessage";
pub const EVENT_MARK_AS_READ: &str = "markAsRead";

// Server -> client events (chatMessage is used in both directions)
pub const EVENT_USER_ONLINE_STATUS: &str = "userOnlineStatus";
pub const EVENT_ROOM_JOINED: &str = "roomJoined";
pub const EVENT_MESSAGE_DELIVERED: &str = "messageDelivered";
pub const EVENT_MESSAGES_READ: &str = "messagesRead";
pub const EVENT_ERROR: &str = "error";

/// One gateway frame: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl GatewayMessage {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

// Inbound payloads. Ids travel as strings and are parsed at the boundary.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub participants: Option<Vec<String>>,
}

/// Payload of an inbound chatMessage. With `room_id` set this is a send to
/// an existing room; with `listing_id` + `listing_type` it is the
/// listing-initiated contact flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub listing_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub room_id: String,
    pub user_id: String,
}
