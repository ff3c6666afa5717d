//! Override request wire format.

pub mod models;
