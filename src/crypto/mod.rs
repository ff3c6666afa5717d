//! Cryptographic checks for override requests.

pub mod credential;
pub mod freshness;
pub mod signature;
pub mod totp;
