use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Listing category. Lookups always pair the id with its kind, so an id
/// queried under the wrong kind does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Property,
    Vehicle,
}

impl ListingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Vehicle => "vehicle",
        }
    }

    /// Strict parse: unknown kinds are rejected, not defaulted.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "property" => Some(Self::Property),
            "vehicle" => Some(Self::Vehicle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub kind: ListingKind,
    pub title: String,
    pub owner_id: i64,
    pub broker_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
