//! Emergency gate error types.

use crate::status::PlatformStatus;
use thiserror::Error;

/// Errors that can occur while authorizing or recording an override.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Too many attempts from this source within the rate-limit window.
    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the oldest counted attempt leaves the window.
        retry_after_seconds: u64,
    },

    /// Source address is not on the allowlist.
    #[error("Source address not on the allowlist")]
    Forbidden,

    /// The transport supplied no peer address to attribute the attempt to.
    #[error("Request has no peer address")]
    NoPeerAddress,

    /// Request body could not be parsed or failed field validation.
    #[error("Malformed override request: {0}")]
    MalformedRequest(String),

    /// Request timestamp is outside the replay window (past or future).
    #[error("Request timestamp outside replay window (skew {skew_seconds}s)")]
    StaleRequest {
        /// `server_now - timestamp`; negative when the request is future-dated.
        skew_seconds: i64,
    },

    /// `X-Emergency-Key` header missing or does not match the configured key.
    #[error("Emergency key missing or mismatched")]
    InvalidEmergencyKey,

    /// TOTP code does not match the current or previous time step.
    #[error("TOTP code rejected")]
    InvalidTotp,

    /// Request signature is malformed or does not match.
    #[error("Request signature rejected")]
    InvalidSignature,

    /// The requested action is not a legal transition from the current status.
    #[error("Transition from {from} to {to} is not permitted")]
    TransitionRejected {
        /// Status at the time of the request.
        from: PlatformStatus,
        /// Status the action asked for.
        to: PlatformStatus,
    },

    /// Audit record could not be queued or durably written (non-fatal).
    #[error("Audit write degraded: {0}")]
    AuditWriteDegraded(String),

    /// Audit sink I/O error.
    #[error("Audit I/O error: {0}")]
    AuditIO(String),

    /// HTTP transport error talking to a gateway.
    #[error("Gateway transport error: {0}")]
    ClientTransport(String),

    /// The gateway answered with a non-success status.
    #[error("Override rejected ({status}): {message}")]
    OverrideRejected {
        /// HTTP status code returned by the gateway.
        status: u16,
        /// Message from the response envelope.
        message: String,
    },

    /// Failed to encode or decode a wire payload.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// HTTP listener failed to bind or serve.
    #[error("Server I/O error: {0}")]
    ServerIO(String),
}

impl GatewayError {
    /// Stable reason string written to the audit trail.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            GatewayError::ConfigError(_) => "config_error",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Forbidden => "forbidden",
            GatewayError::NoPeerAddress => "no_peer_address",
            GatewayError::MalformedRequest(_) => "malformed_request",
            GatewayError::StaleRequest { .. } => "stale_request",
            GatewayError::InvalidEmergencyKey => "invalid_emergency_key",
            GatewayError::InvalidTotp => "invalid_totp",
            GatewayError::InvalidSignature => "invalid_signature",
            GatewayError::TransitionRejected { .. } => "transition_rejected",
            GatewayError::AuditWriteDegraded(_) => "audit_write_degraded",
            GatewayError::AuditIO(_) => "audit_io",
            GatewayError::ClientTransport(_) => "client_transport",
            GatewayError::OverrideRejected { .. } => "override_rejected",
            GatewayError::ProtocolError(_) => "protocol_error",
            GatewayError::ServerIO(_) => "server_io",
        }
    }

    /// Failures the caller must not be able to tell apart.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::StaleRequest { .. }
                | GatewayError::InvalidEmergencyKey
                | GatewayError::InvalidTotp
                | GatewayError::InvalidSignature
        )
    }
}
