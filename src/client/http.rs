//! Reqwest-based operator client for the emergency gateway.
//!
//! The client computes the TOTP code with the same algorithm the gateway
//! verifies, signs the request, and sends the emergency key header.

use crate::clock::{Clock, SystemClock};
use crate::config::EmergencyKey;
use crate::crypto::credential::EMERGENCY_KEY_HEADER;
use crate::crypto::{signature, totp};
use crate::protocol::models::{ErrorEnvelope, OverrideAction, OverrideReceipt, OverrideSubmission};
use crate::status::SystemStatus;
use crate::GatewayError;
use reqwest::blocking::{Client, Response};
use reqwest::header::USER_AGENT;
use std::sync::Arc;
use std::time::Duration;

/// Path of the override endpoint.
pub const OVERRIDE_PATH: &str = "/api/emergency/override";

/// Path of the status endpoint.
pub const STATUS_PATH: &str = "/api/emergency/status";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client for `POST /api/emergency/override`.
pub struct OverrideClient {
    client: Client,
    base_url: String,
    key: EmergencyKey,
    clock: Arc<dyn Clock>,
    user_agent: String,
}

impl OverrideClient {
    /// Create a client for the gateway at `base_url` (e.g. `http://127.0.0.1:8700`).
    pub fn new(base_url: impl Into<String>, key: EmergencyKey) -> Result<Self, GatewayError> {
        Self::with_clock(base_url, key, Arc::new(SystemClock))
    }

    /// Create a client with a custom clock.
    pub fn with_clock(
        base_url: impl Into<String>,
        key: EmergencyKey,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        let client = build_client(DEFAULT_TIMEOUT)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            key,
            clock,
            user_agent: build_user_agent(),
        })
    }

    /// Replace the request timeout.
    pub fn try_with_timeout(mut self, timeout: Duration) -> Result<Self, GatewayError> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Build a signed submission for `action` at the current time.
    pub fn prepare(&self, action: OverrideAction) -> Result<OverrideSubmission, GatewayError> {
        let timestamp = self.clock.unix_seconds();
        let totp_code = totp::generate_at(self.key.as_bytes(), timestamp)?;
        let signature = signature::sign(action, timestamp, &totp_code, self.key.as_bytes())?;

        Ok(OverrideSubmission {
            action,
            timestamp,
            totp_code,
            signature,
        })
    }

    /// Submit an override and return the gateway's receipt.
    ///
    /// # Errors
    /// - `ClientTransport` - the request could not be sent or read
    /// - `OverrideRejected` - the gateway answered with a non-success status
    /// - `ProtocolError` - the success body could not be parsed
    pub fn submit(&self, action: OverrideAction) -> Result<OverrideReceipt, GatewayError> {
        let submission = self.prepare(action)?;
        let url = format!("{}{}", self.base_url, OVERRIDE_PATH);

        tracing::debug!(url = %url, action = %action, "submitting emergency override");

        let response = self
            .client
            .post(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(EMERGENCY_KEY_HEADER, self.key.expose())
            .json(&submission)
            .send()
            .map_err(|e| GatewayError::ClientTransport(format!("Request failed: {}", e)))?;

        read_json(response)
    }

    /// Fetch the current platform status.
    pub fn status(&self) -> Result<SystemStatus, GatewayError> {
        let url = format!("{}{}", self.base_url, STATUS_PATH);
        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|e| GatewayError::ClientTransport(format!("Request failed: {}", e)))?;

        read_json(response)
    }

    /// Configured gateway base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn build_client(timeout: Duration) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::ClientTransport(format!("Failed to create client: {}", e)))
}

fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response
        .bytes()
        .map_err(|e| GatewayError::ClientTransport(format!("Failed to read body: {}", e)))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        return Err(GatewayError::OverrideRejected {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice(&body)
        .map_err(|e| GatewayError::ProtocolError(format!("Failed to parse response: {}", e)))
}

/// User-Agent sent with every request: `emergency-gate/<version>`.
pub fn build_user_agent() -> String {
    format!("emergency-gate/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    const KEY: &str = "owner_emergency_key_from_vault";
    const NOW: i64 = 1_692_358_800;

    fn client() -> OverrideClient {
        OverrideClient::with_clock(
            "http://127.0.0.1:8700/",
            EmergencyKey::new(KEY).unwrap(),
            Arc::new(MockClock::at_unix(NOW)),
        )
        .unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url(), "http://127.0.0.1:8700");
    }

    #[test]
    fn test_prepare_produces_verifiable_submission() {
        let submission = client().prepare(OverrideAction::Shutdown).unwrap();

        assert_eq!(submission.timestamp, NOW);
        assert!(totp::verify(&submission.totp_code, KEY.as_bytes(), NOW));
        assert!(signature::verify(
            OverrideAction::Shutdown,
            NOW,
            &submission.totp_code,
            &submission.signature,
            KEY.as_bytes()
        ));
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            build_user_agent(),
            format!("emergency-gate/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}
