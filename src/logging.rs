use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

/// Directory for all pararun on-disk state.
pub const RUNTIME_DIR: &str = ".para-run";

/// Leveled diagnostics log at `.para-run/run.log`. Diagnostics are never on
/// the correctness path: if the file cannot be opened or written, every call
/// becomes a no-op.
pub struct FileLogger {
    file: Mutex<Option<File>>,
    level: u8,
}

impl FileLogger {
    /// Open (or create) `.para-run/run.log`, appending. Entries above
    /// `level` are dropped.
    pub fn open(level: u8) -> Self {
        Self::open_in(Path::new(RUNTIME_DIR), level)
    }

    pub fn open_in(base: &Path, level: u8) -> Self {
        let file = (|| {
            fs::create_dir_all(base).ok()?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(base.join("run.log"))
                .ok()?;
            let _ = writeln!(file);
            Some(file)
        })();
        Self {
            file: Mutex::new(file),
            level,
        }
    }

    /// A logger that discards everything. Used by tests and as the fallback
    /// when the run log cannot be opened.
    pub fn disabled() -> Self {
        Self {
            file: Mutex::new(None),
            level: 0,
        }
    }

    pub fn log(&self, tag: &str, message: &str, level: u8) {
        if level > self.level {
            return;
        }
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        let Some(file) = guard.as_mut() else {
            return;
        };
        let now = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        for line in message.lines() {
            if writeln!(file, "{now} {level} [{tag}] {line}").is_err() {
                *guard = None;
                return;
            }
        }
    }
}

/// Directory for one run's per-task output logs.
pub fn task_log_dir(start: DateTime<Local>) -> PathBuf {
    Path::new(RUNTIME_DIR)
        .join("logs")
        .join(start.format("%Y%m%d-%H%M%S").to_string())
}

/// Raw copy of one task's output, written as lines arrive. Write failures
/// warn once on the run log and then drop the file; task execution is never
/// blocked or failed by log I/O.
pub struct TaskFileLogger {
    file: Mutex<Option<File>>,
    tag: String,
    emergency: Arc<FileLogger>,
}

impl TaskFileLogger {
    pub fn create(dir: &Path, task_id: usize, emergency: Arc<FileLogger>) -> Self {
        let tag = format!("TaskLog {task_id}");
        let file = (|| {
            fs::create_dir_all(dir).ok()?;
            File::create(dir.join(format!("task-{task_id}.log"))).ok()
        })();
        if file.is_none() {
            emergency.log(&tag, "could not create task log file", 0);
        }
        Self {
            file: Mutex::new(file),
            tag,
            emergency,
        }
    }

    pub fn write(&self, text: &str) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        let Some(file) = guard.as_mut() else {
            return;
        };
        if file.write_all(text.as_bytes()).and_then(|()| file.flush()).is_err() {
            self.emergency.log(&self.tag, "task log write failed, disabling", 0);
            *guard = None;
        }
    }
}
