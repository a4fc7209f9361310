// ABOUTME: Error taxonomy for the deployment pipeline.
// ABOUTME: Every stage failure maps to one variant; kinds give stable names for log lines.

use std::path::PathBuf;

/// Errors that abort the deployment pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another orchestrator instance holds the lock.
    #[error("another deployment is already running (pid {pid}, lock {path})", path = .path.display())]
    AlreadyRunning { pid: u32, path: PathBuf },

    /// Lock file could not be created, read, or parsed.
    #[error("lock error: {0}")]
    Lock(String),

    /// Kernel release or CPU architecture outside the supported set.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Missing build tools could not be installed.
    #[error("failed to install build dependencies: {0}")]
    DependencyInstall(String),

    /// Source fetch failed on every attempt.
    #[error("source fetch failed after {attempts} attempt(s): {cause}")]
    FetchExhausted { attempts: u32, cause: String },

    /// Driver compilation failed (or no build descriptor was found).
    #[error("driver build failed: {0}")]
    Build(String),

    /// DKMS or direct install path failed.
    #[error("driver install failed: {0}")]
    Install(String),

    /// Module unload/load failed.
    #[error("module load failed: {0}")]
    ModuleLoad(String),

    /// Installed module could not be confirmed operational.
    #[error("verification failed: {0}")]
    Verification(String),

    /// Configuration unreadable or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// External termination signal received mid-run.
    #[error("interrupted by {signal}")]
    Interrupted { signal: &'static str, code: i32 },

    /// Backup snapshot could not be written.
    #[error("backup failed: {0}")]
    Backup(String),

    /// Temporary work directory could not be created.
    #[error("workspace error: {0}")]
    Workspace(String),
}

/// Stable failure kinds, used for run-log entries and assertions in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    AlreadyRunning,
    LockFailure,
    UnsupportedPlatform,
    DependencyInstallFailure,
    FetchExhausted,
    BuildFailure,
    InstallFailure,
    ModuleLoadFailure,
    VerificationFailure,
    ConfigFailure,
    Interrupted,
    BackupFailure,
    WorkspaceFailure,
}

impl DeployErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployErrorKind::AlreadyRunning => "AlreadyRunning",
            DeployErrorKind::LockFailure => "LockFailure",
            DeployErrorKind::UnsupportedPlatform => "UnsupportedPlatform",
            DeployErrorKind::DependencyInstallFailure => "DependencyInstallFailure",
            DeployErrorKind::FetchExhausted => "FetchExhausted",
            DeployErrorKind::BuildFailure => "BuildFailure",
            DeployErrorKind::InstallFailure => "InstallFailure",
            DeployErrorKind::ModuleLoadFailure => "ModuleLoadFailure",
            DeployErrorKind::VerificationFailure => "VerificationFailure",
            DeployErrorKind::ConfigFailure => "ConfigFailure",
            DeployErrorKind::Interrupted => "Interrupted",
            DeployErrorKind::BackupFailure => "BackupFailure",
            DeployErrorKind::WorkspaceFailure => "WorkspaceFailure",
        }
    }
}

impl std::fmt::Display for DeployErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::AlreadyRunning { .. } => DeployErrorKind::AlreadyRunning,
            DeployError::Lock(_) => DeployErrorKind::LockFailure,
            DeployError::UnsupportedPlatform(_) => DeployErrorKind::UnsupportedPlatform,
            DeployError::DependencyInstall(_) => DeployErrorKind::DependencyInstallFailure,
            DeployError::FetchExhausted { .. } => DeployErrorKind::FetchExhausted,
            DeployError::Build(_) => DeployErrorKind::BuildFailure,
            DeployError::Install(_) => DeployErrorKind::InstallFailure,
            DeployError::ModuleLoad(_) => DeployErrorKind::ModuleLoadFailure,
            DeployError::Verification(_) => DeployErrorKind::VerificationFailure,
            DeployError::Config(_) => DeployErrorKind::ConfigFailure,
            DeployError::Interrupted { .. } => DeployErrorKind::Interrupted,
            DeployError::Backup(_) => DeployErrorKind::BackupFailure,
            DeployError::Workspace(_) => DeployErrorKind::WorkspaceFailure,
        }
    }

    /// Process exit status for this failure. Signals use the shell convention
    /// (`128 + signo`); everything else exits 1. Teardown failures never
    /// alter this: the status always reflects the original failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Interrupted { code, .. } => *code,
            _ => 1,
        }
    }

    /// The pid holding the lock, when this is a contention error.
    pub fn lock_holder_pid(&self) -> Option<u32> {
        match self {
            DeployError::AlreadyRunning { pid, .. } => Some(*pid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_stable_names() {
        assert_eq!(
            DeployError::Build("make exited 2".into()).kind().as_str(),
            "BuildFailure"
        );
        assert_eq!(
            DeployError::FetchExhausted {
                attempts: 3,
                cause: "timeout".into()
            }
            .kind(),
            DeployErrorKind::FetchExhausted
        );
    }

    #[test]
    fn interrupt_exit_codes_follow_shell_convention() {
        let err = DeployError::Interrupted {
            signal: "SIGINT",
            code: 130,
        };
        assert_eq!(err.exit_code(), 130);
        assert_eq!(DeployError::Build("x".into()).exit_code(), 1);
    }

    #[test]
    fn contention_error_reports_holder_pid() {
        let err = DeployError::AlreadyRunning {
            pid: 1234,
            path: "/run/lock/kmodeploy.lock".into(),
        };
        assert_eq!(err.lock_holder_pid(), Some(1234));
        assert!(err.to_string().contains("1234"));
    }
}
