//! Emergency gate configuration.

use crate::GatewayError;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default allowlist when none is configured: loopback only.
pub const DEFAULT_ALLOWED_IPS: &[&str] = &["127.0.0.1", "::1"];

/// Default listen address for the HTTP surface.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8700";

/// Audit records older than this are eligible for pruning (90 days).
pub const AUDIT_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Shared emergency secret.
///
/// Used as the identity token checked against `X-Emergency-Key` and as the
/// key material for both TOTP and request signatures.
/// SECURITY: never logged; `Debug` is redacted.
#[derive(Clone)]
pub struct EmergencyKey(String);

impl EmergencyKey {
    /// Shortest key accepted at startup.
    pub const MIN_LENGTH: usize = 16;

    /// Wrap a key, rejecting ones that are too short to be a real secret.
    pub fn new(value: impl Into<String>) -> Result<Self, GatewayError> {
        let value = value.into();
        if value.len() < Self::MIN_LENGTH {
            return Err(GatewayError::ConfigError(format!(
                "emergency key must be at least {} characters, got {}",
                Self::MIN_LENGTH,
                value.len()
            )));
        }
        Ok(Self(value))
    }

    /// Raw key bytes (HMAC / TOTP key material).
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Key as a header value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EmergencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EmergencyKey").field(&"[REDACTED]").finish()
    }
}

impl FromStr for EmergencyKey {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Sliding-window limits on authentication attempts per source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Attempts allowed inside one window.
    pub max_attempts: usize,
    /// Trailing window length.
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window: Duration::from_secs(900),
        }
    }
}

/// Where and how audit records are written.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// JSON-lines file; `None` means `data_dir()/<namespace>/audit.jsonl`.
    pub path: Option<PathBuf>,
    /// Namespace directory under the platform data dir.
    pub namespace: String,
    /// Records buffered between the gateway and the writer thread.
    pub queue_capacity: usize,
    /// How long records are kept before `prune` removes them.
    pub retention: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            namespace: "emergency-gate".to_string(),
            queue_capacity: 1024,
            retention: AUDIT_RETENTION,
        }
    }
}

impl AuditConfig {
    /// Retention horizon of `days` whole days.
    pub fn retention_from_days(days: u64) -> Result<Duration, GatewayError> {
        days.checked_mul(SECONDS_PER_DAY)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                GatewayError::ConfigError(format!("retention of {} days is too large", days))
            })
    }
}

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Configuration for the emergency override gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Shared emergency secret.
    pub emergency_key: EmergencyKey,

    /// Authorized source addresses: exact IPs or CIDR ranges.
    pub allowed_ips: Vec<String>,

    /// Per-IP attempt limits.
    pub rate_limit: RateLimitPolicy,

    /// Audit sink settings.
    pub audit: AuditConfig,

    /// HTTP listen address.
    pub bind_addr: SocketAddr,
}

impl GatewayConfig {
    /// Configuration with defaults for everything but the key.
    pub fn new(emergency_key: EmergencyKey) -> Self {
        Self {
            emergency_key,
            allowed_ips: DEFAULT_ALLOWED_IPS.iter().map(|s| s.to_string()).collect(),
            rate_limit: RateLimitPolicy::default(),
            audit: AuditConfig::default(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8700)),
        }
    }

    /// Replace the allowlist.
    pub fn with_allowed_ips<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.emergency_key.as_bytes().len() < EmergencyKey::MIN_LENGTH {
            return Err(GatewayError::ConfigError(
                "emergency key is too short".to_string(),
            ));
        }
        if self.allowed_ips.iter().all(|entry| entry.trim().is_empty()) {
            return Err(GatewayError::ConfigError(
                "allowlist cannot be empty".to_string(),
            ));
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(GatewayError::ConfigError(
                "rate_limit.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window.as_secs() == 0 {
            return Err(GatewayError::ConfigError(
                "rate_limit.window must be at least one second".to_string(),
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err(GatewayError::ConfigError(
                "audit.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated allowlist setting.
pub fn parse_allowed_ips(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EmergencyKey {
        EmergencyKey::new("emergency_master_key_12345678").unwrap()
    }

    #[test]
    fn test_retention_from_days() {
        assert_eq!(AuditConfig::retention_from_days(90).unwrap(), AUDIT_RETENTION);
        assert_eq!(AuditConfig::retention_from_days(0).unwrap(), Duration::ZERO);
        assert!(matches!(
            AuditConfig::retention_from_days(u64::MAX),
            Err(GatewayError::ConfigError(_))
        ));
    }

    #[test]
    fn test_short_key_rejected() {
        let result = EmergencyKey::new("short");
        assert!(matches!(result, Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let rendered = format!("{:?}", test_key());
        assert!(!rendered.contains("emergency_master_key"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::new(test_key());
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.max_attempts, 3);
        assert_eq!(config.rate_limit.window.as_secs(), 900);
        assert_eq!(config.allowed_ips, vec!["127.0.0.1", "::1"]);
    }

    #[test]
    fn test_empty_allowlist_rejected() {
        let config = GatewayConfig::new(test_key()).with_allowed_ips(Vec::<String>::new());
        assert!(matches!(config.validate(), Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = GatewayConfig::new(test_key());
        config.rate_limit.max_attempts = 0;
        assert!(matches!(config.validate(), Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_parse_allowed_ips_trims_and_skips_blanks() {
        let entries = parse_allowed_ips(" 127.0.0.1, ,10.0.0.0/8 ,::1");
        assert_eq!(entries, vec!["127.0.0.1", "10.0.0.0/8", "::1"]);
    }
}
