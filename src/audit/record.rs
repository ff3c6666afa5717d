//! Audit record format (one JSON object per line).

use crate::protocol::models::OverrideAction;
use crate::GatewayError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Final outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    /// Override authorized and applied.
    Success,
    /// Rejected at some step.
    Failure,
}

/// One audited authorization attempt. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Server time of the decision.
    pub timestamp: DateTime<Utc>,

    /// Requested action; `None` when the body could not be read far enough.
    pub action: Option<OverrideAction>,

    /// Peer address of the caller.
    pub source_ip: IpAddr,

    /// Success or failure.
    pub outcome: AuditOutcome,

    /// Specific internal reason (failures only), e.g. `invalid_totp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Extra context for operators. Never contains secret material.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Record for an applied override.
    pub fn success(timestamp: DateTime<Utc>, action: OverrideAction, source_ip: IpAddr) -> Self {
        Self {
            timestamp,
            action: Some(action),
            source_ip,
            outcome: AuditOutcome::Success,
            failure_reason: None,
            detail: None,
        }
    }

    /// Record for a rejected attempt.
    pub fn failure(
        timestamp: DateTime<Utc>,
        action: Option<OverrideAction>,
        source_ip: IpAddr,
        error: &GatewayError,
    ) -> Self {
        Self {
            timestamp,
            action,
            source_ip,
            outcome: AuditOutcome::Failure,
            failure_reason: Some(error.failure_reason().to_string()),
            detail: Some(error.to_string()),
        }
    }

    /// Attach operator-facing detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Serialize as a single line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self)
            .map_err(|e| GatewayError::AuditIO(format!("Failed to serialize record: {}", e)))
    }

    /// Parse one line.
    pub fn from_json_line(line: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(line)
            .map_err(|e| GatewayError::AuditIO(format!("Failed to parse record: {}", e)))
    }

    /// Whether this record is older than `retention` at `now`.
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        match age.to_std() {
            Ok(age) => age > retention,
            // Future-dated record
            Err(_) => false,
        }
    }
}
