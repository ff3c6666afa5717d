//! Operator-side client.

pub mod http;
