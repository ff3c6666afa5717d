//! Shared helpers for integration tests.

#![allow(dead_code)]

use emergency_gate::crypto::{signature, totp};
use emergency_gate::{
    AuditLog, EmergencyKey, GatewayConfig, MemorySink, MockClock, OverrideAction,
    OverrideGateway,
};
use std::sync::Arc;

pub const KEY: &str = "owner_emergency_key_from_vault";
pub const NOW: i64 = 1_692_358_800;

pub struct Fixture {
    pub gateway: Arc<OverrideGateway>,
    pub clock: Arc<MockClock>,
    pub sink: MemorySink,
}

impl Fixture {
    /// Wait for queued audit records, then return them.
    pub fn audit_records(&self) -> Vec<emergency_gate::AuditRecord> {
        self.gateway.audit_log().flush_blocking().unwrap();
        self.sink.records()
    }
}

pub fn key() -> EmergencyKey {
    EmergencyKey::new(KEY).unwrap()
}

pub fn fixture_with(config: GatewayConfig) -> Fixture {
    let clock = Arc::new(MockClock::at_unix(NOW));
    let sink = MemorySink::new();
    let audit = AuditLog::spawn(sink.clone(), 256).unwrap();
    let gateway = OverrideGateway::with_clock(config, audit, clock.clone()).unwrap();
    Fixture {
        gateway: Arc::new(gateway),
        clock,
        sink,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(GatewayConfig::new(key()))
}

/// Correctly signed body for `action`, stamped `timestamp`, with the TOTP
/// code for `totp_at`.
pub fn signed_body(action: OverrideAction, timestamp: i64, totp_at: i64) -> Vec<u8> {
    let code = totp::generate_at(KEY.as_bytes(), totp_at).unwrap();
    let sig = signature::sign(action, timestamp, &code, KEY.as_bytes()).unwrap();
    body(action, timestamp, &code, &sig)
}

pub fn body(action: OverrideAction, timestamp: i64, totp_code: &str, signature: &str) -> Vec<u8> {
    serde_json::json!({
        "action": action,
        "timestamp": timestamp,
        "totp_code": totp_code,
        "signature": signature,
    })
    .to_string()
    .into_bytes()
}
