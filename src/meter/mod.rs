//! Attempt metering.

pub mod attempts;
