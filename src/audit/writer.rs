//! Buffered audit writer.
//!
//! [`AuditLog::record`] never blocks: it pushes onto a bounded queue drained
//! by a dedicated thread. The thread retries failed appends with backoff.
//! When the queue is full, the writer is gone, or retries run out, the
//! record is emitted on the `audit_fallback` tracing target instead.

use crate::audit::record::AuditRecord;
use crate::audit::sink::AuditSink;
use crate::GatewayError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Append attempts per record before falling back.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

enum AuditCommand {
    Record(AuditRecord),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit writer. Cheap to clone.
#[derive(Clone, Debug)]
pub struct AuditLog {
    tx: mpsc::Sender<AuditCommand>,
    fallbacks: Arc<AtomicU64>,
}

impl AuditLog {
    /// Start a writer thread draining into `sink`.
    ///
    /// The thread exits once every handle is dropped and the queue is empty.
    pub fn spawn<S: AuditSink>(sink: S, queue_capacity: usize) -> Result<Self, GatewayError> {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let fallbacks = Arc::new(AtomicU64::new(0));

        let worker_fallbacks = Arc::clone(&fallbacks);
        thread::Builder::new()
            .name("audit-writer".to_string())
            .spawn(move || drain(sink, rx, worker_fallbacks))
            .map_err(|e| GatewayError::AuditIO(format!("Failed to start audit writer: {}", e)))?;

        Ok(Self { tx, fallbacks })
    }

    /// Queue a record for durable append.
    ///
    /// # Errors
    /// * `AuditWriteDegraded` - the record could not be queued; it has been
    ///   written to the fallback channel instead
    pub fn record(&self, record: AuditRecord) -> Result<(), GatewayError> {
        match self.tx.try_send(AuditCommand::Record(record)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(AuditCommand::Record(record))) => {
                self.degrade(&record, "audit queue full")
            }
            Err(mpsc::error::TrySendError::Closed(AuditCommand::Record(record))) => {
                self.degrade(&record, "audit writer stopped")
            }
            Err(_) => Err(GatewayError::AuditWriteDegraded(
                "audit queue rejected record".to_string(),
            )),
        }
    }

    /// Wait until every record queued before this call has been handled.
    pub async fn flush(&self) -> Result<(), GatewayError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(AuditCommand::Flush(done_tx))
            .await
            .map_err(|_| GatewayError::AuditWriteDegraded("audit writer stopped".to_string()))?;
        done_rx
            .await
            .map_err(|_| GatewayError::AuditWriteDegraded("audit writer stopped".to_string()))
    }

    /// Blocking form of [`AuditLog::flush`]. Must not be called from async code.
    pub fn flush_blocking(&self) -> Result<(), GatewayError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .blocking_send(AuditCommand::Flush(done_tx))
            .map_err(|_| GatewayError::AuditWriteDegraded("audit writer stopped".to_string()))?;
        done_rx
            .blocking_recv()
            .map_err(|_| GatewayError::AuditWriteDegraded("audit writer stopped".to_string()))
    }

    /// Records that went to the fallback channel instead of the sink.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    fn degrade(&self, record: &AuditRecord, cause: &str) -> Result<(), GatewayError> {
        emit_fallback(record, cause, &self.fallbacks);
        Err(GatewayError::AuditWriteDegraded(cause.to_string()))
    }
}

fn drain<S: AuditSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<AuditCommand>,
    fallbacks: Arc<AtomicU64>,
) {
    tracing::debug!("audit writer started");
    while let Some(command) = rx.blocking_recv() {
        match command {
            AuditCommand::Record(record) => write_with_retry(&mut sink, &record, &fallbacks),
            AuditCommand::Flush(done) => {
                if let Err(e) = sink.flush() {
                    tracing::warn!(error = %e, "audit sink flush failed");
                }
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("audit writer stopped");
}

fn write_with_retry<S: AuditSink>(sink: &mut S, record: &AuditRecord, fallbacks: &AtomicU64) {
    let mut backoff = INITIAL_BACKOFF;
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        match sink.append(record) {
            Ok(()) => return,
            Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "audit append failed, retrying");
                thread::sleep(backoff);
                backoff *= 2;
            }
            Err(e) => {
                emit_fallback(record, &e.to_string(), fallbacks);
                return;
            }
        }
    }
}

fn emit_fallback(record: &AuditRecord, cause: &str, fallbacks: &AtomicU64) {
    fallbacks.fetch_add(1, Ordering::Relaxed);
    let line = record
        .to_json_line()
        .unwrap_or_else(|_| format!("{:?}", record));
    tracing::error!(
        target: "audit_fallback",
        cause,
        ip = %record.source_ip,
        outcome = ?record.outcome,
        reason = record.failure_reason.as_deref().unwrap_or("-"),
        record = %line,
        "audit record not persisted"
    );
}
