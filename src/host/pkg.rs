// ABOUTME: Platform package manager detection and dependency installation.
// ABOUTME: Computes the missing-tool set and installs it through whichever manager is present.

use super::{CommandRunner, ExecError};

#[derive(Debug, thiserror::Error)]
pub enum PkgError {
    #[error("no supported package manager found (tried apt-get, dnf, yum, zypper, pacman)")]
    NoPackageManager,

    #[error("{manager} failed to install {packages:?}: {detail}")]
    InstallFailed {
        manager: &'static str,
        packages: Vec<String>,
        detail: String,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Package managers probed in order. Install args are non-interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Zypper,
    Pacman,
}

impl PackageManager {
    const ALL: &'static [PackageManager] = &[
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Yum,
        PackageManager::Zypper,
        PackageManager::Pacman,
    ];

    pub fn command(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Zypper => "zypper",
            PackageManager::Pacman => "pacman",
        }
    }

    fn install_args(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Apt => &["install", "-y"],
            PackageManager::Dnf | PackageManager::Yum => &["install", "-y"],
            PackageManager::Zypper => &["install", "-y"],
            PackageManager::Pacman => &["-S", "--noconfirm"],
        }
    }
}

/// Check whether a command resolves on PATH.
pub async fn command_exists<R: CommandRunner>(runner: &R, cmd: &str) -> bool {
    match runner.run("which", &[cmd]).await {
        Ok(out) => out.success(),
        Err(_) => false,
    }
}

/// Detect the first available package manager.
pub async fn detect_manager<R: CommandRunner>(runner: &R) -> Result<PackageManager, PkgError> {
    for manager in PackageManager::ALL {
        if command_exists(runner, manager.command()).await {
            return Ok(*manager);
        }
    }
    Err(PkgError::NoPackageManager)
}

/// Return the `(tool, package)` pairs whose tool is not on PATH.
pub async fn missing_tools<'a, R: CommandRunner>(
    runner: &R,
    required: &'a [(String, String)],
) -> Vec<&'a (String, String)> {
    let mut missing = Vec::new();
    for pair in required {
        if !command_exists(runner, &pair.0).await {
            missing.push(pair);
        }
    }
    missing
}

/// Install the given packages, non-interactively, via the detected manager.
pub async fn install_packages<R: CommandRunner>(
    runner: &R,
    packages: &[String],
) -> Result<(), PkgError> {
    if packages.is_empty() {
        return Ok(());
    }

    let manager = detect_manager(runner).await?;
    let mut args: Vec<&str> = manager.install_args().to_vec();
    args.extend(packages.iter().map(String::as_str));

    tracing::info!(manager = manager.command(), ?packages, "installing packages");

    let out = runner.run(manager.command(), &args).await?;
    if !out.success() {
        return Err(PkgError::InstallFailed {
            manager: manager.command(),
            packages: packages.to_vec(),
            detail: out.diagnostic().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacman_uses_noconfirm() {
        assert_eq!(PackageManager::Pacman.install_args(), &["-S", "--noconfirm"]);
    }

    #[test]
    fn apt_is_probed_first() {
        assert_eq!(PackageManager::ALL[0], PackageManager::Apt);
    }
}
