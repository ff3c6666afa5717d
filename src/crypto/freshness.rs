//! Request freshness enforcement (replay attack prevention).

use crate::clock::Clock;
use crate::GatewayError;

/// Maximum distance between a request timestamp and server time (5 minutes).
///
/// The window is symmetric: future-dated requests are held to the same bound
/// as stale ones.
pub const MAX_REQUEST_SKEW_SECONDS: i64 = 5 * 60;

/// Check that a caller-supplied Unix timestamp is fresh.
///
/// # Errors
/// * `StaleRequest` - `|now - timestamp| > 300`
pub fn check_freshness<C: Clock + ?Sized>(timestamp: i64, clock: &C) -> Result<(), GatewayError> {
    check_freshness_at(timestamp, clock.unix_seconds())
}

/// [`check_freshness`] against an already-sampled server time.
pub fn check_freshness_at(timestamp: i64, now_unix: i64) -> Result<(), GatewayError> {
    let skew_seconds = now_unix.saturating_sub(timestamp);

    if skew_seconds.unsigned_abs() > MAX_REQUEST_SKEW_SECONDS.unsigned_abs() {
        return Err(GatewayError::StaleRequest { skew_seconds });
    }

    Ok(())
}

/// Predicate form of [`check_freshness`].
pub fn is_fresh<C: Clock + ?Sized>(timestamp: i64, clock: &C) -> bool {
    check_freshness(timestamp, clock).is_ok()
}
