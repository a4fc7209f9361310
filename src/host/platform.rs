// ABOUTME: Host platform probes: kernel release, CPU architecture, secure boot.
// ABOUTME: Validation of the probed values lives in the pipeline; this module only queries.

use super::{CommandRunner, ExecError};

/// Architectures the driver build is known to work on.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["x86_64", "aarch64"];

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("'{program}' failed: {detail}")]
    ProbeFailed { program: String, detail: String },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Secure boot state as reported by mokutil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureBoot {
    Enabled,
    Disabled,
    /// mokutil missing or its output unrecognized. Treated as "probably fine".
    Unknown,
}

/// Kernel release string from `uname -r`.
pub async fn kernel_release<R: CommandRunner>(runner: &R) -> Result<String, PlatformError> {
    uname(runner, "-r").await
}

/// Machine architecture from `uname -m`.
pub async fn architecture<R: CommandRunner>(runner: &R) -> Result<String, PlatformError> {
    uname(runner, "-m").await
}

async fn uname<R: CommandRunner>(runner: &R, flag: &str) -> Result<String, PlatformError> {
    let out = runner.run("uname", &[flag]).await?;
    if !out.success() {
        return Err(PlatformError::ProbeFailed {
            program: format!("uname {flag}"),
            detail: out.diagnostic().to_string(),
        });
    }
    Ok(out.stdout.trim().to_string())
}

/// Whether a string has the shape of a kernel release: at least
/// `major.minor.patch` with numeric leading components, e.g. `6.8.0-45-generic`.
pub fn is_valid_kernel_release(release: &str) -> bool {
    // Only the version triple matters; anything after '-' is distro flavor.
    let version = release.split('-').next().unwrap_or("");
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() >= 3
        && parts
            .iter()
            .take(3)
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Probe secure boot via `mokutil --sb-state`.
///
/// Any failure to probe (mokutil absent, non-EFI host, odd output) collapses
/// to [`SecureBoot::Unknown`]; this check can only ever produce a warning.
pub async fn secure_boot_state<R: CommandRunner>(runner: &R) -> SecureBoot {
    let out = match runner.run("mokutil", &["--sb-state"]).await {
        Ok(out) => out,
        Err(_) => return SecureBoot::Unknown,
    };
    if !out.success() {
        return SecureBoot::Unknown;
    }
    let text = out.stdout.to_lowercase();
    if text.contains("secureboot enabled") {
        SecureBoot::Enabled
    } else if text.contains("secureboot disabled") {
        SecureBoot::Disabled
    } else {
        SecureBoot::Unknown
    }
}
