//! Append-only audit trail.
//!
//! Every authorization attempt produces exactly one [`record::AuditRecord`].
//! The gateway hands records to [`writer::AuditLog`], which queues them for
//! a dedicated writer thread so a slow sink never stalls a decision.

pub mod record;
pub mod sink;
pub mod writer;

pub use record::{AuditOutcome, AuditRecord};
pub use sink::{AuditSink, JsonlFileSink, MemorySink};
pub use writer::AuditLog;
