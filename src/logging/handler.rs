//! Per-investigation log file handler (spec §4.10): "Created lazily in the
//! investigation folder on first log write. Rotates at 50 MiB. Flush is
//! synchronous per write; handler close at investigation terminal state is
//! guaranteed on every exit path... if the investigation folder disappears
//! mid-write, log handler records the situation to process log and returns
//! without erroring the investigation."

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::error;

const ROTATE_AT_BYTES: u64 = 50 * 1024 * 1024;

struct OpenFile {
    path: PathBuf,
    file: File,
}

/// Owns one open file handle per active investigation, under
/// `workspace/investigations/YYYY/MM/<inv_id>/investigation.log`.
pub struct LogHandler {
    root: PathBuf,
    open: Mutex<HashMap<String, OpenFile>>,
}

impl LogHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    fn investigation_dir(&self, investigation_id: &str) -> PathBuf {
        let now = Utc::now();
        self.root
            .join("investigations")
            .join(format!("{:04}", now.format("%Y")))
            .join(format!("{:02}", now.format("%m")))
            .join(investigation_id)
    }

    /// Append `line` (already formatted) to the investigation's log file,
    /// opening it lazily and rotating if it has grown past the 50 MiB
    /// threshold. Degrades silently (per spec) if the folder is gone.
    pub fn write_line(&self, investigation_id: &str, line: &str) {
        let mut open = match self.open.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !open.contains_key(investigation_id) {
            match self.open_new(investigation_id) {
                Ok(entry) => {
                    open.insert(investigation_id.to_string(), entry);
                }
                Err(e) => {
                    error!(investigation_id, error = %e, "investigation log folder unavailable, degrading silently");
                    return;
                }
            }
        }

        let entry = open.get_mut(investigation_id).expect("just inserted or present");
        if let Err(e) = writeln!(entry.file, "{line}").and_then(|_| entry.file.flush()) {
            error!(investigation_id, error = %e, "investigation log write failed, degrading silently");
            return;
        }

        if let Ok(metadata) = entry.file.metadata() {
            if metadata.len() > ROTATE_AT_BYTES {
                self.rotate(investigation_id, entry);
            }
        }
    }

    fn open_new(&self, investigation_id: &str) -> std::io::Result<OpenFile> {
        let dir = self.investigation_dir(investigation_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join("investigation.log");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(OpenFile { path, file })
    }

    fn rotate(&self, investigation_id: &str, entry: &mut OpenFile) {
        let rotated = entry.path.with_extension("log.1");
        if fs::rename(&entry.path, &rotated).is_ok() {
            if let Ok(file) = OpenOptions::new().create(true).append(true).open(&entry.path) {
                entry.file = file;
            }
        } else {
            error!(investigation_id, "log rotation failed, continuing to append to oversized file");
        }
    }

    /// Guaranteed to run on every investigation exit path (success,
    /// failure, cancellation) so the file handle is released even if the
    /// process keeps running for other investigations.
    pub fn close(&self, investigation_id: &str) {
        let mut open = match self.open.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut entry) = open.remove(investigation_id) {
            let _ = entry.file.flush();
        }
    }

    pub fn log_path(&self, investigation_id: &str) -> PathBuf {
        self.investigation_dir(investigation_id).join("investigation.log")
    }
}

pub fn read_log(path: impl AsRef<Path>) -> std::io::Result<String> {
    fs::read_to_string(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lazily_creates_and_writes() {
        let dir = tempdir().unwrap();
        let handler = LogHandler::new(dir.path());
        handler.write_line("inv-1", "hello");
        let path = handler.log_path("inv-1");
        assert!(path.exists());
        assert!(read_log(&path).unwrap().contains("hello"));
    }

    #[test]
    fn close_releases_handle_and_reopen_appends() {
        let dir = tempdir().unwrap();
        let handler = LogHandler::new(dir.path());
        handler.write_line("inv-2", "first");
        handler.close("inv-2");
        handler.write_line("inv-2", "second");
        let content = read_log(handler.log_path("inv-2")).unwrap();
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }

    #[test]
    fn degrades_silently_when_root_is_unwritable_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("investigations");
        fs::write(&blocker, b"not a directory").unwrap();
        let handler = LogHandler::new(dir.path());
        // This would fail to create_dir_all since a file occupies the path;
        // the call must not panic.
        handler.write_line("inv-3", "should not panic");
    }
}
