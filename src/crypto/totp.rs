//! Time-based one-time passwords (RFC 6238, HMAC-SHA1, 30 s step, 6 digits).
//!
//! Verification accepts the current step and the one before it. Forward
//! drift is not tolerated, so the TOTP factor never widens the replay window
//! enforced by [`crate::crypto::freshness`].

use crate::GatewayError;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::{Choice, ConstantTimeEq};

type HmacSha1 = Hmac<Sha1>;

/// Length of one TOTP time step.
pub const TIME_STEP_SECONDS: i64 = 30;

/// Digits in an emergency TOTP code.
pub const CODE_DIGITS: u32 = 6;

/// Time-step counter for a Unix time. Pre-epoch times have no step.
pub fn time_step(unix_seconds: i64) -> Option<u64> {
    if unix_seconds < 0 {
        return None;
    }
    Some((unix_seconds / TIME_STEP_SECONDS) as u64)
}

/// HOTP value (RFC 4226) for `counter`, zero-padded to `digits`.
///
/// `digits` must be 1 to 9; a wider modulus does not fit the 31-bit
/// truncated value.
pub fn hotp(secret: &[u8], counter: u64, digits: u32) -> Result<String, GatewayError> {
    let modulus = 10u32
        .checked_pow(digits)
        .filter(|_| digits > 0)
        .ok_or_else(|| GatewayError::ConfigError(format!("unsupported HOTP digits: {}", digits)))?;

    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| GatewayError::ConfigError(format!("invalid TOTP key: {}", e)))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset]) & 0x7f) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);

    let code = binary % modulus;
    Ok(format!("{:0width$}", code, width = digits as usize))
}

/// Generate the 6-digit code for the step containing `unix_seconds`.
pub fn generate_at(secret: &[u8], unix_seconds: i64) -> Result<String, GatewayError> {
    let step = time_step(unix_seconds).ok_or_else(|| {
        GatewayError::ProtocolError(format!("no TOTP step for time {}", unix_seconds))
    })?;
    hotp(secret, step, CODE_DIGITS)
}

/// Verify `code` against the current and previous time steps.
///
/// Both candidates are always computed and compared in constant time.
pub fn verify(code: &str, secret: &[u8], unix_seconds: i64) -> bool {
    if code.len() != CODE_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Some(current) = time_step(unix_seconds) else {
        return false;
    };

    let mut matched = Choice::from(0u8);
    for step in [Some(current), current.checked_sub(1)].into_iter().flatten() {
        match hotp(secret, step, CODE_DIGITS) {
            Ok(candidate) => matched |= candidate.as_bytes().ct_eq(code.as_bytes()),
            Err(_) => return false,
        }
    }
    matched.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B, SHA-1 seed
    const RFC_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn test_rfc6238_eight_digit_vectors() {
        let cases = [
            (59, "94287082"),
            (1_111_111_109, "07081804"),
            (1_111_111_111, "14050471"),
            (1_234_567_890, "89005924"),
            (2_000_000_000, "69279037"),
            (20_000_000_000, "65353130"),
        ];
        for (time, expected) in cases {
            let step = time_step(time).unwrap();
            assert_eq!(hotp(RFC_SECRET, step, 8).unwrap(), expected, "t={}", time);
        }
    }

    #[test]
    fn test_rfc6238_six_digit_codes() {
        assert_eq!(generate_at(RFC_SECRET, 59).unwrap(), "287082");
        assert_eq!(generate_at(RFC_SECRET, 1_111_111_109).unwrap(), "081804");
        assert_eq!(generate_at(RFC_SECRET, 1_234_567_890).unwrap(), "005924");
    }

    #[test]
    fn test_verify_current_step() {
        let code = generate_at(RFC_SECRET, 1_111_111_109).unwrap();
        assert!(verify(&code, RFC_SECRET, 1_111_111_109));
    }

    #[test]
    fn test_verify_previous_step_tolerated() {
        let now = 1_111_111_140;
        let previous = generate_at(RFC_SECRET, now - TIME_STEP_SECONDS).unwrap();
        assert!(verify(&previous, RFC_SECRET, now));
    }

    #[test]
    fn test_verify_two_steps_back_rejected() {
        let now = 1_111_111_140;
        let old = generate_at(RFC_SECRET, now - 2 * TIME_STEP_SECONDS).unwrap();
        let current = generate_at(RFC_SECRET, now).unwrap();
        let previous = generate_at(RFC_SECRET, now - TIME_STEP_SECONDS).unwrap();
        if old != current && old != previous {
            assert!(!verify(&old, RFC_SECRET, now));
        }
    }

    #[test]
    fn test_verify_next_step_rejected() {
        let now = 1_111_111_140;
        let next = generate_at(RFC_SECRET, now + TIME_STEP_SECONDS).unwrap();
        let current = generate_at(RFC_SECRET, now).unwrap();
        let previous = generate_at(RFC_SECRET, now - TIME_STEP_SECONDS).unwrap();
        if next != current && next != previous {
            assert!(!verify(&next, RFC_SECRET, now));
        }
    }

    #[test]
    fn test_verify_wrong_secret() {
        let code = generate_at(RFC_SECRET, 59).unwrap();
        assert!(!verify(&code, b"another-secret-entirely", 59));
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        assert!(!verify("12345", RFC_SECRET, 59));
        assert!(!verify("1234567", RFC_SECRET, 59));
        assert!(!verify("28708a", RFC_SECRET, 59));
        assert!(!verify("", RFC_SECRET, 59));
    }

    #[test]
    fn test_hotp_rejects_unsupported_digit_counts() {
        assert!(matches!(hotp(RFC_SECRET, 1, 10), Err(GatewayError::ConfigError(_))));
        assert!(matches!(hotp(RFC_SECRET, 1, u32::MAX), Err(GatewayError::ConfigError(_))));
        assert!(matches!(hotp(RFC_SECRET, 1, 0), Err(GatewayError::ConfigError(_))));
        assert_eq!(hotp(RFC_SECRET, 1, 9).unwrap().len(), 9);
    }

    #[test]
    fn test_pre_epoch_time_has_no_step() {
        assert_eq!(time_step(-1), None);
        assert!(generate_at(RFC_SECRET, -1).is_err());
        assert!(!verify("287082", RFC_SECRET, -1));
    }
}
