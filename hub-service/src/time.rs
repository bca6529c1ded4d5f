use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds, the clock the core's token/revocation
/// checks compare against (§4.2, §4.3).
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
