//! Audit sinks.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::error;

use super::{AuditCategory, AuditEvent, RotatingFile};

/// Append target for audit events.
///
/// Implementations must be safe under concurrent writers and must have
/// durably handed the event off before `record` returns.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Audit sink backed by a size-rotated file.
///
/// Each event is encoded to a single line and written with one `write`
/// under the mutex, then flushed, so concurrent records never interleave.
pub struct FileAuditSink {
    file: Mutex<RotatingFile>,
}

impl FileAuditSink {
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = RotatingFile::open(path.as_ref(), max_bytes, backups)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit file lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut line = event.to_line();
        line.push('\n');
        if let Err(e) = self.append(&line) {
            // Keep the record somewhere an operator will see it.
            error!("Audit write failed ({}): {}", e, line.trim_end());
            eprintln!("[AUDIT] {}", line.trim_end());
        }
    }
}

impl std::fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditSink").finish_non_exhaustive()
    }
}

/// In-memory audit sink, used by tests and by the CLI dry-run paths.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, category: AuditCategory) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.category == category).count())
            .unwrap_or(0)
    }

    pub fn last(&self) -> Option<AuditEvent> {
        self.events.lock().ok().and_then(|e| e.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditOutcome;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_writes_one_line_per_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileAuditSink::open(&path, 1024 * 1024, 2).unwrap();

        sink.record(AuditEvent::command("nmap", AuditOutcome::Success).with_detail("exit_code", 0));
        sink.record(AuditEvent::validation("mac", AuditOutcome::Failure).with_detail("reason", "bad"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("| COMMAND | nmap | SUCCESS |"));
        assert!(lines[1].contains("| VALIDATION | mac | FAILURE |"));
    }

    #[test]
    fn test_file_sink_concurrent_writers_do_not_interleave() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = Arc::new(FileAuditSink::open(&path, 10 * 1024 * 1024, 1).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.record(
                            AuditEvent::command(format!("cmd{}", t), AuditOutcome::Success)
                                .with_detail("seq", i)
                                .with_detail("pad", "x".repeat(200)),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            assert_eq!(line.matches(" | ").count(), 4, "malformed line: {line}");
        }
    }

    #[test]
    fn test_memory_sink_counts_by_category() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.record(AuditEvent::command("nmap", AuditOutcome::Success));
        sink.record(AuditEvent::validation("target", AuditOutcome::Failure));
        sink.record(AuditEvent::validation("mac", AuditOutcome::Success));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count(AuditCategory::Validation), 2);
        assert_eq!(sink.count(AuditCategory::Command), 1);
        assert_eq!(sink.count(AuditCategory::Privilege), 0);
        assert_eq!(sink.last().unwrap().subject, "mac");
    }
}
