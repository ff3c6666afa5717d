//! Emergency-key header check.

use crate::config::EmergencyKey;
use subtle::ConstantTimeEq;

/// Name of the header carrying the emergency key.
pub const EMERGENCY_KEY_HEADER: &str = "X-Emergency-Key";

/// Compare a presented key with the configured one in constant time.
///
/// A missing header never matches.
pub fn emergency_key_matches(presented: Option<&str>, expected: &EmergencyKey) -> bool {
    match presented {
        Some(presented) => presented.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    }
}
