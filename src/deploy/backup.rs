// ABOUTME: Pre-run snapshot of the installed driver state and its restoration.
// ABOUTME: Captured once before any destructive stage; the sole input to rollback.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::host::{CommandRunner, kmod};

use super::DeployError;

const DKMS_STATUS_FILE: &str = "dkms-status.txt";

/// Backed-up module binary: where it lived and where the copy went.
#[derive(Debug, Clone)]
pub struct ModuleBackup {
    pub original: PathBuf,
    pub saved: PathBuf,
}

/// Snapshot of pre-existing driver state, taken before mutation.
///
/// Created exactly once per run. When no prior installation exists the
/// record is still created, empty, so rollback has a uniform no-op path.
#[derive(Debug, Clone)]
pub struct BackupRecord {
    /// Per-run backup directory, named by timestamp under the backup root.
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub module: Option<ModuleBackup>,
    pub dkms_status: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("cannot restore '{path}': {source}", path = .path.display())]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Kmod(#[from] kmod::KmodError),
}

impl BackupRecord {
    /// Capture the current driver state into `<backup_root>/<timestamp>/`.
    pub async fn capture<R: CommandRunner>(
        runner: &R,
        backup_root: &Path,
        module: &str,
        driver: &str,
    ) -> Result<Self, DeployError> {
        let created_at = Utc::now();
        let root = backup_root.join(created_at.format("%Y%m%d-%H%M%S").to_string());
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| DeployError::Backup(format!("cannot create '{}': {e}", root.display())))?;

        let module_backup = match kmod::module_path(runner, module)
            .await
            .map_err(|e| DeployError::Backup(e.to_string()))?
        {
            Some(original) if original.is_file() => {
                let file_name = original
                    .file_name()
                    .ok_or_else(|| {
                        DeployError::Backup(format!("odd module path '{}'", original.display()))
                    })?
                    .to_owned();
                let saved = root.join(file_name);
                tokio::fs::copy(&original, &saved).await.map_err(|e| {
                    DeployError::Backup(format!("cannot copy '{}': {e}", original.display()))
                })?;
                tracing::info!(from = %original.display(), to = %saved.display(), "backed up module binary");
                Some(ModuleBackup { original, saved })
            }
            _ => None,
        };

        let dkms_status = kmod::dkms_status(runner, driver)
            .await
            .map_err(|e| DeployError::Backup(e.to_string()))?;
        if let Some(status) = &dkms_status {
            tokio::fs::write(root.join(DKMS_STATUS_FILE), status)
                .await
                .map_err(|e| DeployError::Backup(format!("cannot write dkms status: {e}")))?;
        }

        if module_backup.is_none() && dkms_status.is_none() {
            tracing::info!("no prior driver installation found; backup is empty");
        }

        Ok(Self {
            root,
            created_at,
            module: module_backup,
            dkms_status,
        })
    }

    /// Whether anything pre-existed worth restoring.
    pub fn is_empty(&self) -> bool {
        self.module.is_none() && self.dkms_status.is_none()
    }

    /// Restore the backed-up module binary to its original location and
    /// rebuild the module index. With no prior module this is a no-op that
    /// reports success.
    pub async fn restore<R: CommandRunner>(&self, runner: &R) -> Result<(), RestoreError> {
        let Some(backup) = &self.module else {
            tracing::info!("rollback: no prior module to restore");
            return Ok(());
        };

        if let Some(parent) = backup.original.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| RestoreError::Copy {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        tokio::fs::copy(&backup.saved, &backup.original)
            .await
            .map_err(|e| RestoreError::Copy {
                path: backup.original.clone(),
                source: e,
            })?;
        kmod::depmod(runner).await?;

        tracing::info!(path = %backup.original.display(), "rollback: restored previous module binary");
        Ok(())
    }
}
