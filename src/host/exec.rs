// ABOUTME: Subprocess execution trait and its production implementation.
// ABOUTME: Every external tool call goes through CommandRunner so tests can inject a fake.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// Captured result of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit code, if the process exited normally (None if killed by a signal).
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best diagnostic text for error messages: stderr, falling back to stdout.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Errors from launching a subprocess (distinct from the process failing).
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Run external commands and capture their output.
///
/// The orchestrator only ever needs a success/failure signal and captured
/// diagnostic text from its collaborators (package manager, git, make, dkms,
/// modprobe), so this is the entire surface.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command and capture its output.
    async fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput, ExecError>;

    /// Run a command with a working directory.
    async fn run_in(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput, ExecError>;
}

/// Production runner backed by `tokio::process`.
///
/// Stdout/stderr are always captured, never inherited; subprocess noise must
/// not interleave with the orchestrator's own output.
#[derive(Debug, Default, Clone)]
pub struct HostRunner;

impl HostRunner {
    pub fn new() -> Self {
        Self
    }

    async fn exec(
        &self,
        dir: Option<&Path>,
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Cancellation (signal select, timeout) drops this future; the
            // child must die with it, not keep mutating the host.
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(program, ?args, "running command");

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecError::NotFound(program.to_string())
            } else {
                ExecError::Spawn {
                    program: program.to_string(),
                    source: e,
                }
            }
        })?;

        let result = ExecOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            tracing::debug!(program, code = ?result.code, "command failed");
        }

        Ok(result)
    }
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput, ExecError> {
        self.exec(None, program, args).await
    }

    async fn run_in(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput, ExecError> {
        self.exec(Some(dir), program, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = HostRunner::new();
        let out = runner.run("echo", &["hello"]).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn missing_command_is_not_found() {
        let runner = HostRunner::new();
        let err = runner
            .run("definitely_not_a_real_command_12345", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NotFound(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_is_captured_not_an_error() {
        let runner = HostRunner::new();
        let out = runner.run("false", &[]).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.code, Some(1));
    }

    #[tokio::test]
    async fn cancelled_run_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let runner = HostRunner::new();
        let script = format!("sleep 0.4 && touch {}", marker.display());

        let args = ["-c", script.as_str()];
        tokio::select! {
            _ = runner.run("sh", &args) => {}
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
        }

        // Give a surviving child time to reach the touch.
        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        assert!(
            !marker.exists(),
            "child kept running after its future was dropped"
        );
    }

    #[test]
    fn diagnostic_prefers_stderr() {
        let out = ExecOutput {
            code: Some(1),
            stdout: "ignored".into(),
            stderr: "real cause".into(),
        };
        assert_eq!(out.diagnostic(), "real cause");

        let out = ExecOutput {
            code: Some(1),
            stdout: "fallback".into(),
            stderr: "  ".into(),
        };
        assert_eq!(out.diagnostic(), "fallback");
    }
}
