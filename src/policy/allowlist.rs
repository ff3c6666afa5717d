//! Source IP allowlist.
//!
//! Entries are exact addresses or CIDR ranges. An exact address is stored
//! as a host-length network so both forms go through the same check.

use crate::GatewayError;
use ipnet::IpNet;
use std::net::IpAddr;

/// Immutable set of authorized source networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAllowlist {
    entries: Vec<IpNet>,
}

impl IpAllowlist {
    /// Build from configured entries.
    ///
    /// # Errors
    /// * `ConfigError` - an entry is neither an IP nor a CIDR, or the list is empty
    pub fn from_entries<I, S>(entries: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            parsed.push(parse_entry(entry)?);
        }

        if parsed.is_empty() {
            return Err(GatewayError::ConfigError(
                "allowlist cannot be empty".to_string(),
            ));
        }

        Ok(Self { entries: parsed })
    }

    /// Whether `ip` falls inside any entry.
    ///
    /// IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) are matched as IPv4.
    pub fn is_authorized(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.entries.iter().any(|net| net.contains(&ip))
    }

    /// Configured networks.
    pub fn entries(&self) -> &[IpNet] {
        &self.entries
    }
}

fn parse_entry(entry: &str) -> Result<IpNet, GatewayError> {
    if entry.contains('/') {
        return entry
            .parse::<IpNet>()
            .map(|net| net.trunc())
            .map_err(|e| GatewayError::ConfigError(format!("invalid CIDR '{}': {}", entry, e)));
    }
    entry
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|e| GatewayError::ConfigError(format!("invalid IP '{}': {}", entry, e)))
}
