//! HMAC-SHA256 request signatures.
//!
//! The signed message is `"{action}:{timestamp}:{totp_code}"`, binding a
//! signature to one action at one moment. Signatures travel as hex.

use crate::protocol::models::OverrideAction;
use crate::GatewayError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Byte length of an HMAC-SHA256 tag.
pub const SIGNATURE_LEN: usize = 32;

/// Length of the tag rendered as hex on the wire.
pub const SIGNATURE_HEX_LEN: usize = SIGNATURE_LEN * 2;

/// Build the canonical signing string.
pub fn canonical_message(action: OverrideAction, timestamp: i64, totp_code: &str) -> String {
    format!("{}:{}:{}", action.as_str(), timestamp, totp_code)
}

fn keyed_mac(secret: &[u8]) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret).ok()
}

/// Sign a request, returning the lowercase hex tag.
pub fn sign(
    action: OverrideAction,
    timestamp: i64,
    totp_code: &str,
    secret: &[u8],
) -> Result<String, GatewayError> {
    let mut mac = keyed_mac(secret)
        .ok_or_else(|| GatewayError::ConfigError("HMAC rejected the signing key".to_string()))?;
    mac.update(canonical_message(action, timestamp, totp_code).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Exactly `SIGNATURE_HEX_LEN` characters of lowercase hex.
fn is_canonical_hex(signature: &str) -> bool {
    signature.len() == SIGNATURE_HEX_LEN
        && signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Verify a hex signature in constant time.
///
/// Anything other than 64 lowercase hex characters is rejected before
/// decoding. Malformed input and wrong bytes are both just `false`.
pub fn verify(
    action: OverrideAction,
    timestamp: i64,
    totp_code: &str,
    signature: &str,
    secret: &[u8],
) -> bool {
    if !is_canonical_hex(signature) {
        return false;
    }
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    if provided.len() != SIGNATURE_LEN {
        return false;
    }
    let Some(mut mac) = keyed_mac(secret) else {
        return false;
    };
    mac.update(canonical_message(action, timestamp, totp_code).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_secret_key_for_signatures";
    const TIMESTAMP: i64 = 1_692_358_800;

    #[test]
    fn test_canonical_message_format() {
        assert_eq!(
            canonical_message(OverrideAction::SafeMode, TIMESTAMP, "123456"),
            "SAFE_MODE:1692358800:123456"
        );
    }

    #[test]
    fn test_sign_is_deterministic_lowercase_hex() {
        let a = sign(OverrideAction::SafeMode, TIMESTAMP, "123456", SECRET).unwrap();
        let b = sign(OverrideAction::SafeMode, TIMESTAMP, "123456", SECRET).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2
        let tag = {
            let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
            mac.update(b"what do ya want for nothing?");
            hex::encode(mac.finalize().into_bytes())
        };
        assert_eq!(
            tag,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_success() {
        let signature = sign(OverrideAction::Shutdown, TIMESTAMP, "654321", SECRET).unwrap();
        assert!(verify(OverrideAction::Shutdown, TIMESTAMP, "654321", &signature, SECRET));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let signature = sign(OverrideAction::SafeMode, TIMESTAMP, "123456", SECRET).unwrap();

        assert!(!verify(OverrideAction::Shutdown, TIMESTAMP, "123456", &signature, SECRET));
        assert!(!verify(OverrideAction::SafeMode, TIMESTAMP + 1, "123456", &signature, SECRET));
        assert!(!verify(OverrideAction::SafeMode, TIMESTAMP, "654321", &signature, SECRET));
        assert!(!verify(
            OverrideAction::SafeMode,
            TIMESTAMP,
            "123456",
            &signature,
            b"wrong_secret_key_entirely"
        ));
    }

    #[test]
    fn test_verify_rejects_malformed_signatures() {
        let signature = sign(OverrideAction::Normal, TIMESTAMP, "123456", SECRET).unwrap();
        let verify_with =
            |sig: &str| verify(OverrideAction::Normal, TIMESTAMP, "123456", sig, SECRET);

        assert!(!verify_with("invalid_sig"));
        assert!(!verify_with(""));
        assert!(!verify_with(&signature[..62]));
        assert!(!verify_with(&format!("{}00", signature)));
        assert!(!verify_with(&"z".repeat(64)));
    }

    #[test]
    fn test_verify_rejects_uppercase_and_padded_hex() {
        let signature = sign(OverrideAction::Normal, TIMESTAMP, "123456", SECRET).unwrap();
        let verify_with =
            |sig: &str| verify(OverrideAction::Normal, TIMESTAMP, "123456", sig, SECRET);

        assert!(verify_with(&signature));
        assert!(!verify_with(&signature.to_uppercase()));
        assert!(!verify_with(&format!("  {}  ", signature)));
        assert!(!verify_with(&format!("{}\n", signature)));
        assert!(!verify_with(&format!("  {}  ", signature.to_uppercase())));
    }
}
