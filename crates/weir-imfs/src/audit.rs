use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Default audit artifact name, next to the interceptor's working directory.
pub const DEFAULT_AUDIT_LOG: &str = "failed_opens.log";

/// Append-only record of failed opens.
///
/// Each event is one `PATH=<path> | RET=<errno>` line, opened, written and
/// flushed per event so no entry is buffered across a process restart and
/// ordering matches event order. Recording is best-effort: an unwritable
/// audit artifact must never turn into a second failure for the open that
/// is being recorded.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AuditLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failed-open event. `errno` is the positive error value.
    pub fn record_failed_open(&self, path: &str, errno: i32) {
        let line = format!("PATH={path} | RET={errno}\n");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path);
        if let Ok(mut file) = file {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(prefix: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        std::env::temp_dir().join(format!("{prefix}_{pid}_{n}.log"))
    }

    #[test]
    fn events_append_in_order() {
        let path = temp_path("weir_audit");
        let log = AuditLog::new(&path);
        assert_eq!(log.path(), path.as_path());
        log.record_failed_open("/etc/absent", 2);
        log.record_failed_open("/etc/denied", 13);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "PATH=/etc/absent | RET=2\nPATH=/etc/denied | RET=13\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn recording_to_an_unwritable_path_is_silent() {
        let log = AuditLog::new("/nonexistent-dir/audit.log");
        log.record_failed_open("/anything", 2);
    }
}
