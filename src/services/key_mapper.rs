//! Destination key derivation.
//!
//! Keys are `prefix + YYYY/MM/DD/HH/ + source key`, with the hour bucket taken
//! from the batch creation time in UTC. The mapping is pure so a redelivered
//! notification overwrites the objects a previous partial run wrote.

use chrono::{DateTime, Utc};

const HOUR_BUCKET_FORMAT: &str = "%Y/%m/%d/%H/";

/// Format the `YYYY/MM/DD/HH/` segment for an epoch-millisecond timestamp.
///
/// Sub-second precision is dropped. Timestamps chrono cannot represent fall
/// back to the Unix epoch so the result stays deterministic.
pub fn hour_bucket(timestamp_ms: u64) -> String {
    let at = i64::try_from(timestamp_ms / 1000)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(DateTime::UNIX_EPOCH);
    at.format(HOUR_BUCKET_FORMAT).to_string()
}

/// Build the destination key for `source_key`. No normalization is applied.
pub fn destination_key(timestamp_ms: u64, source_key: &str, prefix: &str) -> String {
    let bucket = hour_bucket(timestamp_ms);
    let mut key = String::with_capacity(prefix.len() + bucket.len() + source_key.len());
    key.push_str(prefix);
    key.push_str(&bucket);
    key.push_str(source_key);
    key
}
