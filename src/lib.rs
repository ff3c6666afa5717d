//! # Emergency Gate
//!
//! **Multi-factor, replay-safe emergency override gateway with an audit trail.**
//!
//! Emergency Gate authorizes a small set of platform-wide control actions
//! (`SAFE_MODE`, `SHUTDOWN`, `NORMAL`) and drives a global status state
//! machine that the rest of the platform reads.
//!
//! ## Features
//!
//! - **Layered checks**: per-IP rate limit, IP allowlist, 5-minute replay
//!   window, emergency key header, TOTP, HMAC-SHA256 request signature
//! - **Constant-time comparisons** for every secret-dependent check
//! - **Generic failures**: callers never learn which factor failed
//! - **Audit trail**: exactly one JSON-lines record per attempt, written by
//!   a buffered background writer that never stalls a decision
//! - **Status gate**: `SAFE_MODE` / `SHUTDOWN` block ordinary routes while
//!   emergency routes stay reachable
//!
//! ## Quickstart
//!
//! ```no_run
//! use emergency_gate::{EmergencyKey, GatewayConfig, OverrideGateway};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), emergency_gate::GatewayError> {
//!     let key = EmergencyKey::new("a-long-random-emergency-key")?;
//!     let config = GatewayConfig::new(key).with_allowed_ips(["127.0.0.1", "10.0.0.0/8"]);
//!     let addr = config.bind_addr;
//!
//!     let gateway = Arc::new(OverrideGateway::open(config)?);
//!     emergency_gate::server::serve(gateway, addr).await
//! }
//! ```
//!
//! ## Threat Model
//!
//! Emergency Gate protects against:
//! - **Replay**: requests older or newer than 5 minutes are rejected
//! - **Credential probing**: attempts are rate-limited per source address and
//!   every authentication failure looks the same to the caller
//! - **Tampering**: the signature binds action, timestamp and TOTP code
//!
//! The peer address is taken from the TCP connection. Deploying behind a
//! proxy that rewrites it defeats the allowlist.

#![warn(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod status;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Policy and metering
pub mod meter;
pub mod policy;

// Audit trail
pub mod audit;

// Orchestrator (main public API)
pub mod gateway;

// HTTP surface
pub mod server;

// Operator client
pub mod client;

// Re-exports for public API
pub use audit::{AuditLog, AuditOutcome, AuditRecord, AuditSink, JsonlFileSink, MemorySink};
pub use client::http::OverrideClient;
pub use clock::{Clock, SystemClock};
pub use config::{EmergencyKey, GatewayConfig, RateLimitPolicy};
pub use errors::GatewayError;
pub use gateway::{OverrideAttempt, OverrideGateway, OverrideGrant};
pub use protocol::models::{OverrideAction, OverrideReceipt};
pub use status::{PlatformStatus, StatusHandle, SystemStatus};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
