use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace role of an account. Anything unrecognized falls back to `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Client,
    Broker,
    Owner,
    User,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Broker => "broker",
            Self::Owner => "owner",
            Self::User => "user",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" => Self::Client,
            "broker" => Self::Broker,
            "owner" => Self::Owner,
            _ => Self::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

pub const FALLBACK_NAME: &str = "Unknown";
pub const FALLBACK_PHOTO: &str = "default-avatar.png";

/// Public profile snapshot attached to every outgoing chat message.
/// Always complete: missing fields take the fixed fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub photo: String,
    pub user_type: UserType,
}

impl UserProfile {
    pub fn assemble(
        id: i64,
        name: Option<String>,
        photo: Option<String>,
        user_type: Option<UserType>,
    ) -> Self {
        Self {
            id,
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_NAME.to_string()),
            photo: photo
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_PHOTO.to_string()),
            user_type: user_type.unwrap_or(UserType::User),
        }
    }

    /// Projection for a sender with no user record at all.
    pub fn fallback(id: i64) -> Self {
        Self::assemble(id, None, None, None)
    }
}
