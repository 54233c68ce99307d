use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Epoch for the timestamp field: 2024-01-01T00:00:00Z. Shifting the origin
/// keeps ids positive in an i64 well past the service's lifetime.
const PARLEY_EPOCH: u64 = 1_704_067_200_000;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Time-ordered id for rooms and messages: millisecond timestamp since
/// [`PARLEY_EPOCH`] in the top 42 bits, then 10 bits of worker id (so
/// several chat instances can share one database without coordination),
/// then a 12-bit wrapping sequence to disambiguate ids minted in the same
/// millisecond.
pub fn generate(worker_id: u16) -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64;
    let timestamp = now - PARLEY_EPOCH;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0xFFF;
    let id = (timestamp << 22) | ((worker_id as u64 & 0x3FF) << 12) | seq;
    id as i64
}

/// Extract the Unix timestamp (ms) from a snowflake.
pub fn timestamp_millis(id: i64) -> u64 {
    ((id as u64) >> 22) + PARLEY_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_increasing_in_time() {
        let a = generate(1);
        let b = generate(1);
        assert_ne!(a, b);
        assert!(timestamp_millis(a) <= timestamp_millis(b));
    }

    #[test]
    fn timestamp_round_trips_through_the_id() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = generate(3);
        let after = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let ts = timestamp_millis(id);
        assert!(ts >= before && ts <= after);
    }
}
