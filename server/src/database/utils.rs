use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio_rusqlite::rusqlite;
use uuid;

/// Get current Unix timestamp in seconds
pub fn get_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Generate a UUID-based session id (doubles as the bearer token)
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a time-sortable snowflake-style user id: millisecond timestamp
/// in the high bits, random noise in the low 22 bits.  Sorting by id sorts
/// by creation time; the noise keeps same-millisecond creations distinct.
pub fn generate_user_id() -> i64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    let noise = rand::thread_rng().gen_range(0..(1i64 << 22));
    (millis << 22) | noise
}

/// Generate an opaque CSRF nonce for the OAuth state round-trip.
pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Parse a JSON string-array column (`roles`, `permissions`).
///
/// Corrupt JSON surfaces as a conversion failure rather than an empty list —
/// a row must never silently lose its roles.
pub(crate) fn json_string_list(raw: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
