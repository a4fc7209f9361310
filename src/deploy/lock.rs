// ABOUTME: Single-instance process lock backed by an atomically created lock file.
// ABOUTME: The file holds JSON LockInfo so contenders can report who owns the deployment.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeployError;

/// Information about who holds the deployment lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// Driver being deployed.
    pub driver: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(driver: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
            driver: driver.to_string(),
        }
    }
}

/// Exclusive ownership of the deployment process.
///
/// Acquisition is non-blocking and atomic (`create_new`): if the lock file
/// already exists, acquisition fails immediately reporting the recorded
/// holder pid. There is no waiting variant and no stale-breaking; a leftover
/// lock from a dead run is removed by the operator (the error names the
/// path). Release is idempotent, and `Drop` removes the file as a backstop
/// so no exit path can leak the lock.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    held: bool,
}

impl ProcessLock {
    /// Try to acquire the lock, recording this process as the holder.
    pub fn acquire(path: &Path, driver: &str) -> Result<Self, DeployError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DeployError::Lock(format!("cannot create lock directory: {e}")))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let info = LockInfo::new(driver);
                let json = serde_json::to_string(&info)
                    .map_err(|e| DeployError::Lock(format!("cannot serialize lock info: {e}")))?;
                file.write_all(json.as_bytes())
                    .map_err(|e| DeployError::Lock(format!("cannot write lock file: {e}")))?;
                tracing::debug!(path = %path.display(), pid = info.pid, "lock acquired");
                Ok(Self {
                    path: path.to_path_buf(),
                    held: true,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Self::contention_error(path))
            }
            Err(e) => Err(DeployError::Lock(format!(
                "cannot create lock file '{}': {e}",
                path.display()
            ))),
        }
    }

    fn contention_error(path: &Path) -> DeployError {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<LockInfo>(&content) {
                Ok(info) => DeployError::AlreadyRunning {
                    pid: info.pid,
                    path: path.to_path_buf(),
                },
                Err(_) => DeployError::Lock(format!(
                    "lock file '{}' exists but its contents are unreadable",
                    path.display()
                )),
            },
            Err(e) => DeployError::Lock(format!(
                "lock file '{}' exists but cannot be read: {e}",
                path.display()
            )),
        }
    }

    /// Release the lock. Safe to call more than once; removal of an already
    /// missing file is not an error.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "lock released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove lock file: {e}"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_holder_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.lock");

        let lock = ProcessLock::acquire(&path, "rtl8812au").unwrap();
        let info: LockInfo =
            serde_json::from_str(&std::fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.driver, "rtl8812au");
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn second_acquire_reports_holder_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.lock");

        let _lock = ProcessLock::acquire(&path, "rtl8812au").unwrap();
        let err = ProcessLock::acquire(&path, "rtl8812au").unwrap_err();
        assert_eq!(err.lock_holder_pid(), Some(std::process::id()));
    }

    #[test]
    fn release_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.lock");

        let mut lock = ProcessLock::acquire(&path, "rtl8812au").unwrap();
        assert!(path.is_file());
        lock.release();
        assert!(!path.exists());
        lock.release(); // second call is a no-op
    }

    #[test]
    fn drop_removes_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.lock");
        {
            let _lock = ProcessLock::acquire(&path, "rtl8812au").unwrap();
            assert!(path.is_file());
        }
        assert!(!path.exists());
    }

    #[test]
    fn corrupted_lock_file_is_a_lock_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.lock");
        std::fs::write(&path, "not json").unwrap();

        let err = ProcessLock::acquire(&path, "rtl8812au").unwrap_err();
        assert!(matches!(err, DeployError::Lock(_)));
    }

    #[test]
    fn lock_recorded_for_another_pid_still_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.lock");
        let foreign = LockInfo {
            holder: "other-host".into(),
            pid: 1234,
            acquired_at: Utc::now(),
            driver: "rtl8812au".into(),
        };
        std::fs::write(&path, serde_json::to_string(&foreign).unwrap()).unwrap();

        let err = ProcessLock::acquire(&path, "rtl8812au").unwrap_err();
        assert_eq!(err.lock_holder_pid(), Some(1234));
        assert!(err.to_string().contains("1234"));
    }
}
