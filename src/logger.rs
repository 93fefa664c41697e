// Decision Log
// A line-oriented log of sync decisions, written only when the `logging`
// setting is on. Logging is fire-and-forget: a failed write never affects
// the sync outcome.

use chrono::Utc;
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sink for decision-log lines.
pub trait SyncLogger {
    /// Append one line. Implementations must swallow their own failures.
    fn write(&self, message: &str);
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

/// Discards every line.
pub struct NullLogger;

impl SyncLogger for NullLogger {
    fn write(&self, _message: &str) {}
}

/// Appends timestamped lines to a file.
pub struct FileLogger {
    path: PathBuf,
}

impl FileLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileLogger {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SyncLogger for FileLogger {
    fn write(&self, message: &str) {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            let _ = writeln!(
                file,
                "{} {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S"),
                message
            );
        }
    }
}

/// Collects lines in memory so tests can assert on them. The engine runs
/// single-threaded within one host callback, so interior mutability through
/// RefCell is sufficient.
pub struct MemoryLogger {
    lines: RefCell<Vec<String>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        MemoryLogger {
            lines: RefCell::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncLogger for MemoryLogger {
    fn write(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }
}

// ============================================================================
// TESTS
// ============================================================================
