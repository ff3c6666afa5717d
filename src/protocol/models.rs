//! Override wire structs and request parsing.

use crate::crypto::totp::CODE_DIGITS;
use crate::status::PlatformStatus;
use crate::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Platform-wide control actions an override can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideAction {
    /// Enter degraded safe mode.
    SafeMode,
    /// Full shutdown.
    Shutdown,
    /// Return to normal operation.
    Normal,
}

impl OverrideAction {
    /// Every action, in declaration order.
    pub const ALL: [OverrideAction; 3] = [
        OverrideAction::SafeMode,
        OverrideAction::Shutdown,
        OverrideAction::Normal,
    ];

    /// Canonical wire name, also used in the signing string.
    pub fn as_str(self) -> &'static str {
        match self {
            OverrideAction::SafeMode => "SAFE_MODE",
            OverrideAction::Shutdown => "SHUTDOWN",
            OverrideAction::Normal => "NORMAL",
        }
    }

    /// Platform status this action moves to.
    pub fn target_status(self) -> PlatformStatus {
        match self {
            OverrideAction::SafeMode => PlatformStatus::SafeMode,
            OverrideAction::Shutdown => PlatformStatus::Shutdown,
            OverrideAction::Normal => PlatformStatus::Normal,
        }
    }
}

impl fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideAction {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OverrideAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GatewayError::MalformedRequest(format!("unknown action: {}", s)))
    }
}

/// JSON body of `POST /api/emergency/override`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideSubmission {
    /// Requested action.
    pub action: OverrideAction,
    /// Caller's Unix time in seconds.
    pub timestamp: i64,
    /// 6-digit TOTP code.
    pub totp_code: String,
    /// Lowercase hex HMAC-SHA256 over `action:timestamp:totp_code`.
    pub signature: String,
}

/// A parsed, field-validated override request.
///
/// Exists only for the duration of one authorization attempt.
#[derive(Debug, Clone)]
pub struct OverrideRequest {
    /// Requested action.
    pub action: OverrideAction,
    /// Caller's Unix time in seconds.
    pub timestamp: i64,
    /// 6-digit TOTP code.
    pub totp_code: String,
    /// Hex signature as presented.
    pub signature: String,
    /// Peer address of the caller.
    pub source_ip: IpAddr,
}

impl OverrideRequest {
    /// Parse and validate a JSON body.
    ///
    /// # Errors
    /// * `MalformedRequest` - body is not the expected JSON shape, or the TOTP
    ///   code is not exactly six ASCII digits
    pub fn parse(body: &[u8], source_ip: IpAddr) -> Result<Self, GatewayError> {
        let submission: OverrideSubmission = serde_json::from_slice(body)
            .map_err(|e| GatewayError::MalformedRequest(format!("invalid body: {}", e)))?;

        let totp_code = submission.totp_code.trim();
        if totp_code.len() != CODE_DIGITS as usize || !totp_code.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(GatewayError::MalformedRequest(format!(
                "totp_code must be {} digits",
                CODE_DIGITS
            )));
        }

        Ok(Self {
            action: submission.action,
            timestamp: submission.timestamp,
            totp_code: totp_code.to_string(),
            signature: submission.signature,
            source_ip,
        })
    }

    /// Best-effort action extraction for audit records when parsing fails.
    pub fn requested_action(body: &[u8]) -> Option<OverrideAction> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        value.get("action")?.as_str()?.parse().ok()
    }
}

/// Success response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideReceipt {
    /// Human-readable outcome.
    pub message: String,
    /// Server time of the decision, Unix seconds.
    pub timestamp: i64,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always `true`.
    pub error: bool,
    /// Client-safe message.
    pub message: String,
    /// Stable machine-readable code.
    pub code: String,
}
