//! Console log sink.
//!
//! An append-only, timestamped record of everything the console does.
//! Entries are kept in emission order and are only removed by
//! [`ConsoleLog::drain`] or [`ConsoleLog::clear`]. Every appended entry is
//! also mirrored to `tracing` so headless runs keep a diagnostic trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Severity of a console log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One console line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        }
    }
}

/// Tracing target that mirrors every console entry.
pub const CONSOLE_TARGET: &str = "hdlforge::console";

/// Shared handle to the console log. Clones append to the same record.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        // A panicking writer cannot leave a half-pushed entry behind.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn append(&self, entry: LogEntry) {
        match entry.severity {
            Severity::Info => tracing::info!(target: CONSOLE_TARGET, "{}", entry.message),
            Severity::Success => {
                tracing::info!(target: CONSOLE_TARGET, success = true, "{}", entry.message)
            }
            Severity::Warning => tracing::warn!(target: CONSOLE_TARGET, "{}", entry.message),
            Severity::Error => tracing::error!(target: CONSOLE_TARGET, "{}", entry.message),
        }
        self.lock().push(entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(LogEntry::new(Severity::Info, message));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.append(LogEntry::new(Severity::Success, message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.append(LogEntry::new(Severity::Warning, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(LogEntry::new(Severity::Error, message));
    }

    /// Copy of all entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Remove and return all entries, oldest first.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.lock())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
