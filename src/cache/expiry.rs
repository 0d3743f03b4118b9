//! Expiry Translation
//!
//! Converts a relative TTL in milliseconds into the expiry value the store
//! expects on a write.
//!
//! The store reads its expiry field as relative seconds only up to 30 days;
//! anything larger is taken as an absolute Unix timestamp. TTLs above the
//! threshold are therefore sent as `stored + ttl` in Unix seconds. The result is
//! clamped to at least 1 because an expiry of 0 means "never expire".

/// 30 days in milliseconds, the largest TTL sent as a relative offset
pub const RELATIVE_TTL_MAX_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Translate `ttl_ms` written at `stored_at_ms` into store expiry seconds
pub fn to_backend_expiry(ttl_ms: i64, stored_at_ms: i64) -> u64 {
    let secs = if ttl_ms <= RELATIVE_TTL_MAX_MS {
        ttl_ms.div_euclid(1000)
    } else {
        stored_at_ms.saturating_add(ttl_ms).div_euclid(1000)
    };
    secs.max(1) as u64
}
