//! Source-address policy.

pub mod allowlist;
