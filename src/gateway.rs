//! Override gateway - the orchestrator every emergency request goes through.
//!
//! The `OverrideGateway` runs one attempt through the checks in a fixed
//! order, stopping at the first failure:
//! 1. Rate limiter (per source IP)
//! 2. IP allowlist
//! 3. Body parsing
//! 4. Replay window
//! 5. Emergency key header
//! 6. TOTP
//! 7. Request signature
//! 8. Status transition
//!
//! Exactly one audit record is written per attempt, whatever the outcome.

use crate::audit::{AuditLog, AuditRecord, JsonlFileSink};
use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::crypto::credential::emergency_key_matches;
use crate::crypto::freshness::check_freshness_at;
use crate::crypto::{signature, totp};
use crate::meter::attempts::{AttemptLimiter, RateDecision};
use crate::policy::allowlist::IpAllowlist;
use crate::protocol::models::{OverrideAction, OverrideReceipt, OverrideRequest};
use crate::status::{PlatformStatus, StatusHandle, SystemStatus, TransitionKind};
use crate::GatewayError;
use chrono::{DateTime, Utc};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

/// One inbound override attempt, as received from the transport.
#[derive(Debug, Clone, Copy)]
pub struct OverrideAttempt<'a> {
    /// Peer address of the connection.
    pub source_ip: IpAddr,
    /// `X-Emergency-Key` header value, if present.
    pub emergency_key: Option<&'a str>,
    /// Raw request body.
    pub body: &'a [u8],
}

/// A successfully authorized and applied override.
#[derive(Debug, Clone)]
pub struct OverrideGrant {
    /// Action that was applied.
    pub action: OverrideAction,
    /// Status before the action.
    pub previous: PlatformStatus,
    /// Status after the action.
    pub status: SystemStatus,
    /// Whether the status actually changed.
    pub changed: bool,
    /// Server time of the decision.
    pub decided_at: DateTime<Utc>,
}

impl OverrideGrant {
    /// Response body for the caller.
    pub fn receipt(&self) -> OverrideReceipt {
        let message = match (self.action, self.changed) {
            (OverrideAction::SafeMode, true) => "System is now in SAFE_MODE.".to_string(),
            (OverrideAction::Shutdown, true) => "System is now in SHUTDOWN mode.".to_string(),
            (OverrideAction::Normal, true) => "System is now in NORMAL mode.".to_string(),
            (action, false) => format!("System is already in {} mode.", action),
        };
        OverrideReceipt {
            message,
            timestamp: self.decided_at.timestamp(),
        }
    }
}

/// Emergency override gateway.
///
/// Create one per process and share it (it is `Send + Sync`).
pub struct OverrideGateway {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    allowlist: IpAllowlist,
    limiter: AttemptLimiter,
    status: StatusHandle,
    audit: AuditLog,
}

impl OverrideGateway {
    /// Create a gateway writing audit records to the configured file sink.
    ///
    /// # Errors
    /// - `ConfigError` - configuration validation fails
    /// - `AuditIO` - the audit file or writer thread cannot be set up
    pub fn open(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let sink = match &config.audit.path {
            Some(path) => JsonlFileSink::new(path)?,
            None => JsonlFileSink::with_namespace(&config.audit.namespace)?,
        };
        tracing::info!(path = %sink.path().display(), "audit trail opened");
        let audit = AuditLog::spawn(sink, config.audit.queue_capacity)?;
        Self::new(config, audit)
    }

    /// Create a gateway using the system clock.
    pub fn new(config: GatewayConfig, audit: AuditLog) -> Result<Self, GatewayError> {
        Self::with_clock(config, audit, Arc::new(SystemClock))
    }

    /// Create a gateway with a custom clock.
    pub fn with_clock(
        config: GatewayConfig,
        audit: AuditLog,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let allowlist = IpAllowlist::from_entries(&config.allowed_ips)?;
        let limiter = AttemptLimiter::new(config.rate_limit);
        let status = StatusHandle::new(clock.now_utc());

        Ok(Self {
            config,
            clock,
            allowlist,
            limiter,
            status,
            audit,
        })
    }

    /// Authorize and apply one override attempt.
    ///
    /// # Errors
    /// - `RateLimited` - too many attempts from this source
    /// - `Forbidden` - source not on the allowlist
    /// - `MalformedRequest` - body unreadable or fields invalid
    /// - `StaleRequest` - timestamp outside the replay window
    /// - `InvalidEmergencyKey` - header missing or wrong
    /// - `InvalidTotp` - code matches neither the current nor previous step
    /// - `InvalidSignature` - signature malformed or wrong
    /// - `TransitionRejected` - not a legal move from the current status
    pub fn authorize(&self, attempt: OverrideAttempt<'_>) -> Result<OverrideGrant, GatewayError> {
        let now = self.clock.now_utc();
        let source_ip = attempt.source_ip;
        let result = self.evaluate(&attempt, now);

        let record = match &result {
            Ok(grant) => {
                tracing::info!(
                    ip = %source_ip,
                    action = %grant.action,
                    from = %grant.previous,
                    changed = grant.changed,
                    "emergency override applied"
                );
                let record = AuditRecord::success(now, grant.action, source_ip);
                if grant.changed {
                    record
                } else {
                    record.with_detail("no state change")
                }
            }
            Err(e) => {
                tracing::warn!(ip = %source_ip, reason = e.failure_reason(), "emergency override rejected");
                let action = OverrideRequest::requested_action(attempt.body);
                AuditRecord::failure(now, action, source_ip, e)
            }
        };

        if let Err(e) = self.audit.record(record) {
            tracing::warn!(error = %e, "audit write degraded");
        }

        result
    }

    /// Reject an attempt whose transport reported no peer address.
    ///
    /// The attempt is still audited, attributed to `0.0.0.0`.
    pub fn reject_unattributed(&self, body: &[u8]) -> GatewayError {
        let now = self.clock.now_utc();
        let error = GatewayError::NoPeerAddress;
        tracing::warn!(reason = error.failure_reason(), "emergency override rejected");

        let action = OverrideRequest::requested_action(body);
        let record = AuditRecord::failure(now, action, IpAddr::V4(Ipv4Addr::UNSPECIFIED), &error);
        if let Err(e) = self.audit.record(record) {
            tracing::warn!(error = %e, "audit write degraded");
        }
        error
    }

    fn evaluate(
        &self,
        attempt: &OverrideAttempt<'_>,
        now: DateTime<Utc>,
    ) -> Result<OverrideGrant, GatewayError> {
        let source_ip = attempt.source_ip;

        if let RateDecision::Blocked {
            retry_after_seconds,
        } = self.limiter.check_and_record(source_ip, now)
        {
            return Err(GatewayError::RateLimited {
                retry_after_seconds,
            });
        }

        if !self.allowlist.is_authorized(source_ip) {
            return Err(GatewayError::Forbidden);
        }

        let request = OverrideRequest::parse(attempt.body, source_ip)?;

        check_freshness_at(request.timestamp, now.timestamp())?;

        let key = &self.config.emergency_key;
        if !emergency_key_matches(attempt.emergency_key, key) {
            return Err(GatewayError::InvalidEmergencyKey);
        }

        if !totp::verify(&request.totp_code, key.as_bytes(), now.timestamp()) {
            return Err(GatewayError::InvalidTotp);
        }

        if !signature::verify(
            request.action,
            request.timestamp,
            &request.totp_code,
            &request.signature,
            key.as_bytes(),
        ) {
            return Err(GatewayError::InvalidSignature);
        }

        let applied = self.status.apply(request.action, source_ip, now)?;

        Ok(OverrideGrant {
            action: request.action,
            previous: applied.previous,
            status: applied.status,
            changed: applied.kind == TransitionKind::Changed,
            decided_at: now,
        })
    }

    /// Current platform status.
    pub fn status(&self) -> SystemStatus {
        self.status.current()
    }

    /// Shared status handle for readers and subscribers.
    pub fn status_handle(&self) -> &StatusHandle {
        &self.status
    }

    /// Whether `ip` is on the allowlist.
    pub fn is_allowed_source(&self, ip: IpAddr) -> bool {
        self.allowlist.is_authorized(ip)
    }

    /// Drop idle rate-limit windows. Returns how many sources were forgotten.
    pub fn sweep_rate_limits(&self) -> usize {
        self.limiter.sweep(self.clock.now_utc())
    }

    /// Audit writer handle.
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Active configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
