use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub name: Option<String>,
    pub participant_ids: Vec<i64>,
    pub listing_id: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical form of a participant set: deduplicated, sorted ascending.
/// Two id lists describe the same room key iff this returns the same vector.
pub fn canonical_participants(ids: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = ids.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Key column form of a canonical participant set (`id:id:...`), used by the
/// uniqueness constraint on plain rooms.
pub fn participants_key(ids: &[i64]) -> String {
    canonical_participants(ids)
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(":")
}
