// ABOUTME: Kernel module tooling wrappers: modinfo, lsmod, modprobe, dkms, depmod.
// ABOUTME: Thin captured-output wrappers; policy (fatal vs warning) is decided by the pipeline.

use std::path::{Path, PathBuf};

use super::{CommandRunner, ExecError};

#[derive(Debug, thiserror::Error)]
pub enum KmodError {
    #[error("failed to query loaded modules: {0}")]
    QueryFailed(String),

    #[error("modprobe {verb} '{module}' failed: {detail}")]
    Modprobe {
        verb: &'static str,
        module: String,
        detail: String,
    },

    #[error("dkms {step} failed: {detail}")]
    Dkms { step: &'static str, detail: String },

    #[error("make install failed: {0}")]
    MakeInstall(String),

    #[error("depmod failed: {0}")]
    Depmod(String),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Kernel module names use underscores even when the on-disk name has dashes.
fn normalize(name: &str) -> String {
    name.replace('-', "_")
}

/// Installed path of a module's binary via `modinfo -n`, or None if the
/// module is unknown to the running kernel's module index (or modinfo itself
/// is absent; this is a probe, not a requirement).
pub async fn module_path<R: CommandRunner>(
    runner: &R,
    module: &str,
) -> Result<Option<PathBuf>, KmodError> {
    let out = match runner.run("modinfo", &["-n", module]).await {
        Ok(out) => out,
        Err(ExecError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !out.success() {
        return Ok(None);
    }
    let path = out.stdout.trim();
    if path.is_empty() {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(path)))
    }
}

/// Whether `modinfo` can describe the module at all.
pub async fn module_known<R: CommandRunner>(runner: &R, module: &str) -> Result<bool, KmodError> {
    let out = runner.run("modinfo", &[module]).await?;
    Ok(out.success())
}

/// Whether the module is currently loaded, per `lsmod`.
pub async fn module_loaded<R: CommandRunner>(runner: &R, module: &str) -> Result<bool, KmodError> {
    let out = runner.run("lsmod", &[]).await?;
    if !out.success() {
        return Err(KmodError::QueryFailed(out.diagnostic().to_string()));
    }
    let wanted = normalize(module);
    Ok(out
        .stdout
        .lines()
        .skip(1) // header
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == wanted))
}

/// Load a module with `modprobe`.
pub async fn load_module<R: CommandRunner>(runner: &R, module: &str) -> Result<(), KmodError> {
    let out = runner.run("modprobe", &[module]).await?;
    if !out.success() {
        return Err(KmodError::Modprobe {
            verb: "load",
            module: module.to_string(),
            detail: out.diagnostic().to_string(),
        });
    }
    Ok(())
}

/// Unload a module with `modprobe -r`. The caller checks loaded-state first;
/// an unload of a module that is not loaded never reaches this function.
pub async fn unload_module<R: CommandRunner>(runner: &R, module: &str) -> Result<(), KmodError> {
    let out = runner.run("modprobe", &["-r", module]).await?;
    if !out.success() {
        return Err(KmodError::Modprobe {
            verb: "unload",
            module: module.to_string(),
            detail: out.diagnostic().to_string(),
        });
    }
    Ok(())
}

/// `dkms status <driver>` output, or None when dkms is absent or silent.
pub async fn dkms_status<R: CommandRunner>(
    runner: &R,
    driver: &str,
) -> Result<Option<String>, KmodError> {
    let out = match runner.run("dkms", &["status", driver]).await {
        Ok(out) => out,
        Err(ExecError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !out.success() {
        return Ok(None);
    }
    let status = out.stdout.trim();
    if status.is_empty() {
        Ok(None)
    } else {
        Ok(Some(status.to_string()))
    }
}

/// Whether the dkms tool itself is available.
pub async fn dkms_available<R: CommandRunner>(runner: &R) -> bool {
    super::pkg::command_exists(runner, "dkms").await
}

/// Run the DKMS add/build/install sequence for a source tree.
///
/// "already added" from `dkms add` is tolerated so a re-run after a partial
/// earlier attempt does not fail on registration.
pub async fn dkms_install<R: CommandRunner>(
    runner: &R,
    source_dir: &Path,
    driver: &str,
    version: &str,
) -> Result<(), KmodError> {
    let spec = format!("{driver}/{version}");

    let out = runner.run_in(source_dir, "dkms", &["add", "."]).await?;
    if !out.success() && !out.diagnostic().to_lowercase().contains("already") {
        return Err(KmodError::Dkms {
            step: "add",
            detail: out.diagnostic().to_string(),
        });
    }

    let out = runner.run("dkms", &["build", &spec]).await?;
    if !out.success() {
        return Err(KmodError::Dkms {
            step: "build",
            detail: out.diagnostic().to_string(),
        });
    }

    let out = runner.run("dkms", &["install", "--force", &spec]).await?;
    if !out.success() {
        return Err(KmodError::Dkms {
            step: "install",
            detail: out.diagnostic().to_string(),
        });
    }

    Ok(())
}

/// Direct install path: `make install` in the source tree, then `depmod -a`.
pub async fn make_install<R: CommandRunner>(
    runner: &R,
    source_dir: &Path,
) -> Result<(), KmodError> {
    let out = runner.run_in(source_dir, "make", &["install"]).await?;
    if !out.success() {
        return Err(KmodError::MakeInstall(out.diagnostic().to_string()));
    }
    depmod(runner).await
}

/// Rebuild the module dependency index.
pub async fn depmod<R: CommandRunner>(runner: &R) -> Result<(), KmodError> {
    let out = runner.run("depmod", &["-a"]).await?;
    if !out.success() {
        return Err(KmodError::Depmod(out.diagnostic().to_string()));
    }
    Ok(())
}

/// Outcome of the best-effort initramfs refresh after install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitramfsOutcome {
    Refreshed(&'static str),
    /// Neither update-initramfs nor dracut is present.
    Unavailable,
    Failed(&'static str, String),
}

/// Refresh the boot-time initramfs so the new module is present at next boot.
/// Cosmetic for the running session, so every outcome is non-fatal.
pub async fn refresh_initramfs<R: CommandRunner>(runner: &R) -> InitramfsOutcome {
    let candidates: [(&str, &[&str]); 2] = [
        ("update-initramfs", &["-u"]),
        ("dracut", &["--force"]),
    ];

    for (tool, args) in candidates {
        match runner.run(tool, args).await {
            Ok(out) if out.success() => return InitramfsOutcome::Refreshed(tool),
            Ok(out) => return InitramfsOutcome::Failed(tool, out.diagnostic().to_string()),
            Err(ExecError::NotFound(_)) => continue,
            Err(e) => return InitramfsOutcome::Failed(tool, e.to_string()),
        }
    }

    InitramfsOutcome::Unavailable
}

/// Non-loopback network interface names from /sys/class/net.
pub async fn network_interfaces<R: CommandRunner>(
    runner: &R,
) -> Result<Vec<String>, KmodError> {
    let out = runner.run("ls", &["/sys/class/net"]).await?;
    if !out.success() {
        return Err(KmodError::QueryFailed(out.diagnostic().to_string()));
    }
    Ok(out
        .stdout
        .split_whitespace()
        .filter(|name| *name != "lo")
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_dashes_to_underscores() {
        assert_eq!(normalize("rtl8812-au"), "rtl8812_au");
        assert_eq!(normalize("8812au"), "8812au");
    }
}
