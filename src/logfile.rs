// ABOUTME: Append-only run log with `<timestamp> [LEVEL] <message>` lines.
// ABOUTME: This is the on-disk audit trail; console feedback goes through tracing.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;

/// Severity of a run log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Append-only log file shared by the pipeline and the teardown drains.
pub struct LogFile {
    writer: Mutex<File>,
}

impl LogFile {
    /// Open (creating parents and the file as needed) in append mode.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(file),
        })
    }

    /// Append one timestamped line. Write failures are reported via tracing
    /// and otherwise swallowed: the log must never take the deployment down.
    pub fn append(&self, level: Level, message: &str) {
        let line = format!(
            "{} [{}] {}\n",
            Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            level.as_str(),
            message
        );
        let mut file = self.writer.lock();
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!("failed to append to run log: {e}");
        }
    }

    pub fn info(&self, message: &str) {
        self.append(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.append(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.append(Level::Error, message);
    }
}
