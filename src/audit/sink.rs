//! Audit sinks.
//!
//! The file sink stores JSON lines under `dirs::data_dir()/<namespace>/` by
//! default. Appends and prunes hold an exclusive advisory lock on a sidecar
//! `audit.jsonl.lock` file, so a prune in another process (which swaps the
//! file via temp + rename) never drops a record appended mid-rewrite.

use crate::audit::record::AuditRecord;
use crate::GatewayError;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Durable destination for audit records.
pub trait AuditSink: Send + 'static {
    /// Append one record. Must be durable when this returns `Ok`.
    fn append(&mut self, record: &AuditRecord) -> Result<(), GatewayError>;

    /// Flush buffered state, if any.
    fn flush(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// JSON-lines file sink.
#[derive(Debug, Clone)]
pub struct JsonlFileSink {
    path: PathBuf,
}

impl JsonlFileSink {
    /// File name used under a namespace directory.
    pub const FILE_NAME: &'static str = "audit.jsonl";

    /// Sink writing to `path`, creating parent directories.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| GatewayError::AuditIO(format!("Failed to create audit dir: {}", e)))?;
        }
        Ok(Self { path })
    }

    /// Sink at `dirs::data_dir()/<namespace>/audit.jsonl`.
    pub fn with_namespace(namespace: &str) -> Result<Self, GatewayError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| GatewayError::AuditIO("Could not find data directory".to_string()))?;
        Self::new(base_dir.join(namespace).join(Self::FILE_NAME))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar lock file shared by appenders and pruners.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.lock")
    }

    /// Block until this process holds the exclusive trail lock.
    fn lock(&self) -> Result<TrailLock, GatewayError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| GatewayError::AuditIO(format!("Failed to open audit lock: {}", e)))?;
        file.lock_exclusive()
            .map_err(|e| GatewayError::AuditIO(format!("Failed to lock audit log: {}", e)))?;
        Ok(TrailLock { file })
    }

    /// Read every record. A missing file is an empty trail.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, GatewayError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| GatewayError::AuditIO(format!("Failed to read audit log: {}", e)))?;

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(AuditRecord::from_json_line)
            .collect()
    }

    /// Remove records older than `retention`, returning how many were dropped.
    ///
    /// Lines that do not parse are kept. The rewrite goes through a temp file
    /// and an atomic rename.
    pub fn prune_expired(
        &self,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, GatewayError> {
        let _guard = self.lock()?;
        if !self.path.exists() {
            return Ok(0);
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| GatewayError::AuditIO(format!("Failed to read audit log: {}", e)))?;

        let mut kept = String::with_capacity(contents.len());
        let mut removed = 0;
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            match AuditRecord::from_json_line(line) {
                Ok(record) if record.is_expired(retention, now) => removed += 1,
                _ => {
                    kept.push_str(line);
                    kept.push('\n');
                }
            }
        }

        if removed == 0 {
            return Ok(0);
        }

        let temp_path = self.path.with_extension("jsonl.tmp");
        fs::write(&temp_path, kept.as_bytes())
            .map_err(|e| GatewayError::AuditIO(format!("Failed to write temp file: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| GatewayError::AuditIO(format!("Failed to rename audit log: {}", e)))?;

        Ok(removed)
    }
}

impl AuditSink for JsonlFileSink {
    fn append(&mut self, record: &AuditRecord) -> Result<(), GatewayError> {
        let mut line = record.to_json_line()?;
        line.push('\n');

        let _guard = self.lock()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| GatewayError::AuditIO(format!("Failed to open audit log: {}", e)))?;
        file.write_all(line.as_bytes())
            .map_err(|e| GatewayError::AuditIO(format!("Failed to append record: {}", e)))?;
        file.sync_data()
            .map_err(|e| GatewayError::AuditIO(format!("Failed to sync audit log: {}", e)))?;
        Ok(())
    }
}

/// Held exclusive lock, released on drop.
struct TrailLock {
    file: File,
}

impl Drop for TrailLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// In-memory sink. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemorySink {
    fn append(&mut self, record: &AuditRecord) -> Result<(), GatewayError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::AuditOutcome;
    use crate::protocol::models::OverrideAction;
    use chrono::TimeZone;
    use std::net::IpAddr;
    use tempfile::TempDir;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    fn record_on(day: u32) -> AuditRecord {
        let at = Utc.with_ymd_and_hms(2025, 1, day, 8, 30, 0).unwrap();
        AuditRecord::success(at, OverrideAction::SafeMode, localhost())
    }

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = JsonlFileSink::new(temp_dir.path().join("nested/audit.jsonl")).unwrap();

        sink.append(&record_on(1)).unwrap();
        sink.append(&AuditRecord::failure(
            record_on(2).timestamp,
            None,
            localhost(),
            &GatewayError::InvalidSignature,
        ))
        .unwrap();

        let records = sink.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record_on(1));
        assert_eq!(records[1].outcome, AuditOutcome::Failure);
        assert_eq!(records[1].failure_reason.as_deref(), Some("invalid_signature"));
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlFileSink::new(temp_dir.path().join("audit.jsonl")).unwrap();
        assert!(sink.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_prune_drops_only_expired_records() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = JsonlFileSink::new(temp_dir.path().join("audit.jsonl")).unwrap();
        sink.append(&record_on(1)).unwrap();
        sink.append(&record_on(20)).unwrap();

        let now = Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap();
        let removed = sink
            .prune_expired(Duration::from_secs(90 * 24 * 60 * 60), now)
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(sink.read_all().unwrap(), vec![record_on(20)]);
        assert!(!temp_dir.path().join("audit.jsonl.tmp").exists());
    }

    #[test]
    fn test_prune_keeps_unparseable_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.jsonl");
        let mut sink = JsonlFileSink::new(&path).unwrap();
        sink.append(&record_on(1)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not-a-record").unwrap();

        let now = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(
            sink.prune_expired(Duration::from_secs(90 * 24 * 60 * 60), now)
                .unwrap(),
            1
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "not-a-record\n");
    }

    #[test]
    fn test_prune_while_appending_keeps_fresh_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.jsonl");
        let mut sink = JsonlFileSink::new(&path).unwrap();
        let pruner = JsonlFileSink::new(&path).unwrap();

        let now = Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap();
        let retention = Duration::from_secs(90 * 24 * 60 * 60);
        let expired = record_on(1);
        let fresh = record_on(20);

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop = Arc::clone(&done);
        let handle = std::thread::spawn(move || {
            let mut pruned = 0;
            while !stop.load(std::sync::atomic::Ordering::SeqCst) {
                pruned += pruner.prune_expired(retention, now).unwrap();
            }
            pruned
        });

        for _ in 0..300 {
            sink.append(&expired).unwrap();
            sink.append(&fresh).unwrap();
        }
        done.store(true, std::sync::atomic::Ordering::SeqCst);
        let pruned_concurrently = handle.join().unwrap();
        let pruned_after = sink.prune_expired(retention, now).unwrap();

        let records = sink.read_all().unwrap();
        assert_eq!(records.len(), 300);
        assert!(records.iter().all(|r| *r == fresh));
        assert_eq!(pruned_concurrently + pruned_after, 300);
    }

    #[test]
    fn test_memory_sink_clones_share_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.append(&record_on(3)).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0], record_on(3));
    }
}
