// ABOUTME: The deployment state machine: Stage enum, stage bodies, and the Deployer.
// ABOUTME: Strictly linear stages with uniform teardown on failure or external signal.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::host::platform::SecureBoot;
use crate::host::{CommandRunner, kmod, pkg, platform};
use crate::logfile::LogFile;

use super::actions::{ActionStack, Phase};
use super::backup::BackupRecord;
use super::error::DeployError;
use super::lock::ProcessLock;
use super::retry::RetryPolicy;

/// One discrete, ordered step of the deployment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Locking,
    PlatformValidation,
    DependencyCheck,
    Backup,
    Fetch,
    Compile,
    Install,
    ModuleLoad,
    Verification,
}

impl Stage {
    /// The full pipeline in execution order. A stage only runs when every
    /// predecessor succeeded; there is no branching back.
    pub const SEQUENCE: &'static [Stage] = &[
        Stage::Locking,
        Stage::PlatformValidation,
        Stage::DependencyCheck,
        Stage::Backup,
        Stage::Fetch,
        Stage::Compile,
        Stage::Install,
        Stage::ModuleLoad,
        Stage::Verification,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Locking => "locking",
            Stage::PlatformValidation => "platform-validation",
            Stage::DependencyCheck => "dependency-check",
            Stage::Backup => "backup",
            Stage::Fetch => "fetch",
            Stage::Compile => "compile",
            Stage::Install => "install",
            Stage::ModuleLoad => "module-load",
            Stage::Verification => "verification",
        }
    }

    /// Whether a failure in this stage runs the rollback stack.
    ///
    /// Conservative contract: everything from Backup onward rolls back,
    /// including Compile, even though compilation only writes into the
    /// cleanup-tracked work directory.
    pub fn triggers_rollback(&self) -> bool {
        matches!(
            self,
            Stage::Backup
                | Stage::Fetch
                | Stage::Compile
                | Stage::Install
                | Stage::ModuleLoad
                | Stage::Verification
        )
    }
}

/// Ambient state threaded through the stages of one run.
#[derive(Default)]
pub struct DeploymentContext {
    pub kernel_release: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub backup: Option<BackupRecord>,
}

/// Successful run summary.
#[derive(Debug)]
pub struct Report {
    pub warnings: Vec<Warning>,
}

struct StageFailure {
    stage: Option<Stage>,
    error: DeployError,
}

/// Top-level orchestrator: wires config, host runner, run log, action
/// stacks, and the stage sequence together for a single deployment.
pub struct Deployer<R> {
    config: Config,
    host: Arc<R>,
    log: Arc<LogFile>,
    diagnostics: Diagnostics,
    actions: ActionStack,
    ctx: DeploymentContext,
    lock: Option<ProcessLock>,
}

impl<R: CommandRunner + 'static> Deployer<R> {
    pub fn new(config: Config, host: R) -> Result<Self, DeployError> {
        let log = LogFile::open(&config.log_file).map_err(|e| {
            DeployError::Config(format!(
                "cannot open log file '{}': {e}",
                config.log_file.display()
            ))
        })?;
        Ok(Self {
            config,
            host: Arc::new(host),
            log: Arc::new(log),
            diagnostics: Diagnostics::default(),
            actions: ActionStack::new(),
            ctx: DeploymentContext::default(),
            lock: None,
        })
    }

    /// Run the full pipeline. On any fatal failure or termination signal:
    /// drain rollback, drain cleanup, release the lock, and report the
    /// original failure; on success, discard rollback, drain cleanup,
    /// release the lock.
    pub async fn run(mut self) -> Result<Report, DeployError> {
        tracing::info!(stage = Stage::Locking.name(), "acquiring deployment lock");
        match ProcessLock::acquire(&self.config.lock_file, &self.config.driver) {
            Ok(lock) => self.lock = Some(lock),
            Err(error) => {
                // Nothing was mutated; report and stop without teardown.
                self.log.error(&format!("{}: {error}", error.kind()));
                return Err(error);
            }
        }

        self.log.info(&format!(
            "deployment of {} {} started (module {})",
            self.config.driver, self.config.version, self.config.module
        ));

        let outcome = tokio::select! {
            res = self.run_stages() => res,
            (signal, code) = shutdown_signal() => Err(StageFailure {
                stage: None,
                error: DeployError::Interrupted { signal, code },
            }),
        };

        match outcome {
            Ok(()) => {
                self.teardown(false).await;
                self.log.info("deployment completed successfully");
                tracing::info!("deployment completed successfully");
                Ok(Report {
                    warnings: self.diagnostics.warnings().to_vec(),
                })
            }
            Err(StageFailure { stage, error }) => {
                self.log.error(&format!("{}: {error}", error.kind()));
                // A signal can arrive at any point, so it conservatively
                // rolls back; stage failures consult the policy table.
                let rollback = stage.is_none_or(|s| s.triggers_rollback());
                self.teardown(rollback).await;
                match stage {
                    Some(stage) => {
                        self.log
                            .error(&format!("deployment failed at stage {}", stage.name()));
                        tracing::error!(stage = stage.name(), "deployment failed: {error}");
                    }
                    None => {
                        self.log.error("deployment aborted by signal");
                        tracing::error!("deployment aborted by signal");
                    }
                }
                Err(error)
            }
        }
    }

    async fn run_stages(&mut self) -> Result<(), StageFailure> {
        for &stage in Stage::SEQUENCE {
            if stage == Stage::Locking {
                continue; // acquired up front, before any stage body runs
            }
            tracing::info!(stage = stage.name(), "stage started");
            self.log.info(&format!("stage {} started", stage.name()));

            let result = match stage {
                Stage::Locking => Ok(()),
                Stage::PlatformValidation => self.validate_platform().await,
                Stage::DependencyCheck => self.check_dependencies().await,
                Stage::Backup => self.capture_backup().await,
                Stage::Fetch => self.fetch_source().await,
                Stage::Compile => self.compile().await,
                Stage::Install => self.install().await,
                Stage::ModuleLoad => self.load_module().await,
                Stage::Verification => self.verify().await,
            };

            match result {
                Ok(()) => self.log.info(&format!("stage {} ok", stage.name())),
                Err(error) => {
                    return Err(StageFailure {
                        stage: Some(stage),
                        error,
                    });
                }
            }
        }
        Ok(())
    }

    /// Kernel release shape, architecture support, secure boot (warning only).
    async fn validate_platform(&mut self) -> Result<(), DeployError> {
        let release = platform::kernel_release(&*self.host)
            .await
            .map_err(|e| DeployError::UnsupportedPlatform(e.to_string()))?;
        if !platform::is_valid_kernel_release(&release) {
            return Err(DeployError::UnsupportedPlatform(format!(
                "kernel release '{release}' does not look like a version string"
            )));
        }

        let arch = platform::architecture(&*self.host)
            .await
            .map_err(|e| DeployError::UnsupportedPlatform(e.to_string()))?;
        if !self.config.supported_architectures.iter().any(|a| a == &arch) {
            return Err(DeployError::UnsupportedPlatform(format!(
                "architecture '{arch}' is not supported (supported: {})",
                self.config.supported_architectures.join(", ")
            )));
        }

        if platform::secure_boot_state(&*self.host).await == SecureBoot::Enabled {
            self.warn(Warning::secure_boot(
                "secure boot is enabled; the unsigned module may be rejected at load time",
            ));
        }

        tracing::info!(release, arch, "platform validated");
        self.ctx.kernel_release = Some(release);
        Ok(())
    }

    /// Install whichever required build tools are missing.
    async fn check_dependencies(&mut self) -> Result<(), DeployError> {
        let missing = pkg::missing_tools(&*self.host, &self.config.required_tools).await;
        if missing.is_empty() {
            tracing::info!("all required build tools present");
            return Ok(());
        }

        let packages = self.config.packages_for(&missing);
        self.log
            .info(&format!("installing missing packages: {}", packages.join(", ")));
        pkg::install_packages(&*self.host, &packages)
            .await
            .map_err(|e| DeployError::DependencyInstall(e.to_string()))
    }

    /// Snapshot prior driver state and register its restoration for rollback.
    async fn capture_backup(&mut self) -> Result<(), DeployError> {
        let record = BackupRecord::capture(
            &*self.host,
            &self.config.backup_root,
            &self.config.module,
            &self.config.driver,
        )
        .await?;

        let host = Arc::clone(&self.host);
        let snapshot = record.clone();
        self.actions
            .push(Phase::Rollback, "restore previous driver state", move || async move {
                snapshot.restore(&*host).await.map_err(Into::into)
            });

        self.ctx.backup = Some(record);
        Ok(())
    }

    /// Clone the driver source into a fresh work directory, with retry.
    async fn fetch_source(&mut self) -> Result<(), DeployError> {
        let work_dir = tempfile::Builder::new()
            .prefix("kmodeploy-")
            .tempdir()
            .map_err(|e| DeployError::Workspace(format!("cannot create work directory: {e}")))?
            .keep();

        let dir = work_dir.clone();
        self.actions.push(
            Phase::Cleanup,
            format!("remove work directory {}", dir.display()),
            move || async move {
                match tokio::fs::remove_dir_all(&dir).await {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                    _ => Ok(()),
                }
            },
        );

        let target = work_dir.join("src");
        let policy = RetryPolicy {
            max_attempts: self.config.fetch_attempts,
            base_delay: self.config.fetch_base_delay,
        };
        let repo = self.config.source_repo.clone();

        policy
            .run("git clone", |_attempt| {
                let host = Arc::clone(&self.host);
                let repo = repo.clone();
                let target = target.clone();
                async move {
                    // A failed earlier attempt may have left a partial tree.
                    let _ = tokio::fs::remove_dir_all(&target).await;
                    let target_str = target.display().to_string();
                    let out = host
                        .run("git", &["clone", "--depth", "1", &repo, &target_str])
                        .await
                        .map_err(|e| e.to_string())?;
                    if out.success() {
                        Ok(())
                    } else {
                        Err(out.diagnostic().to_string())
                    }
                }
            })
            .await
            .map_err(|e| DeployError::FetchExhausted {
                attempts: e.attempts,
                cause: e.cause,
            })?;

        tracing::info!(repo = %self.config.source_repo, dir = %target.display(), "source fetched");
        self.ctx.work_dir = Some(work_dir);
        self.ctx.source_dir = Some(target);
        Ok(())
    }

    /// Validate the build descriptor and run the native build. Single
    /// attempt: rebuilding identical inputs reproduces the same failure.
    async fn compile(&mut self) -> Result<(), DeployError> {
        let Some(source) = self.ctx.source_dir.as_deref() else {
            return Err(DeployError::Build(
                "no fetched source directory to build".to_string(),
            ));
        };

        let has_makefile = source.join("Makefile").is_file();
        let has_dkms_conf = source.join("dkms.conf").is_file();
        if !has_makefile && !has_dkms_conf {
            return Err(DeployError::Build(
                "fetched source has neither a Makefile nor a dkms.conf".to_string(),
            ));
        }

        let out = self
            .host
            .run_in(source, "make", &[])
            .await
            .map_err(|e| DeployError::Build(e.to_string()))?;
        if !out.success() {
            return Err(DeployError::Build(out.diagnostic().to_string()));
        }
        Ok(())
    }

    /// DKMS-integrated install when possible, direct `make install` otherwise,
    /// then a best-effort initramfs refresh.
    async fn install(&mut self) -> Result<(), DeployError> {
        let Some(source) = self.ctx.source_dir.as_deref() else {
            return Err(DeployError::Install(
                "no fetched source directory to install from".to_string(),
            ));
        };

        let use_dkms =
            source.join("dkms.conf").is_file() && kmod::dkms_available(&*self.host).await;
        if use_dkms {
            tracing::info!("installing via dkms");
            kmod::dkms_install(&*self.host, source, &self.config.driver, &self.config.version)
                .await
                .map_err(|e| DeployError::Install(e.to_string()))?;
        } else {
            tracing::info!("installing via make install");
            kmod::make_install(&*self.host, source)
                .await
                .map_err(|e| DeployError::Install(e.to_string()))?;
        }

        match kmod::refresh_initramfs(&*self.host).await {
            kmod::InitramfsOutcome::Refreshed(tool) => {
                self.log.info(&format!("initramfs refreshed via {tool}"));
            }
            kmod::InitramfsOutcome::Unavailable => {
                self.warn(Warning::initramfs(
                    "no initramfs refresh tool found; module will still load this session",
                ));
            }
            kmod::InitramfsOutcome::Failed(tool, detail) => {
                self.warn(Warning::initramfs(format!(
                    "initramfs refresh via {tool} failed: {detail}"
                )));
            }
        }
        Ok(())
    }

    /// Swap the running module: unload any active instance, load the new one.
    async fn load_module(&mut self) -> Result<(), DeployError> {
        let module = &self.config.module;

        let loaded = kmod::module_loaded(&*self.host, module)
            .await
            .map_err(|e| DeployError::ModuleLoad(e.to_string()))?;
        if loaded {
            self.log.info(&format!("unloading active module {module}"));
            kmod::unload_module(&*self.host, module)
                .await
                .map_err(|e| DeployError::ModuleLoad(e.to_string()))?;
        } else {
            tracing::debug!(module, "module not loaded; skipping unload");
        }

        kmod::load_module(&*self.host, module)
            .await
            .map_err(|e| DeployError::ModuleLoad(e.to_string()))
    }

    /// Confirm the module is queryable and live; interfaces are advisory.
    async fn verify(&mut self) -> Result<(), DeployError> {
        let module = &self.config.module;

        let known = kmod::module_known(&*self.host, module)
            .await
            .map_err(|e| DeployError::Verification(e.to_string()))?;
        if !known {
            return Err(DeployError::Verification(format!(
                "modinfo cannot describe module '{module}'"
            )));
        }

        let loaded = kmod::module_loaded(&*self.host, module)
            .await
            .map_err(|e| DeployError::Verification(e.to_string()))?;
        if !loaded {
            return Err(DeployError::Verification(format!(
                "module '{module}' is not in the live module list"
            )));
        }

        match kmod::network_interfaces(&*self.host).await {
            Ok(interfaces) if !interfaces.is_empty() => {
                tracing::info!(?interfaces, "network interfaces present");
            }
            Ok(_) => {
                self.warn(Warning::no_interfaces(
                    "no network interface detected; hardware may be plugged in later",
                ));
            }
            Err(e) => {
                self.warn(Warning::no_interfaces(format!(
                    "could not enumerate network interfaces: {e}"
                )));
            }
        }
        Ok(())
    }

    /// Uniform teardown: rollback (failure only) strictly before cleanup,
    /// then lock release. Teardown failures are recorded as warnings and
    /// never replace the original failure.
    async fn teardown(&mut self, rollback: bool) {
        if rollback {
            for failure in self.actions.drain(Phase::Rollback).await {
                self.record_teardown_failure("rollback", failure);
            }
        } else {
            self.actions.discard_rollback();
        }

        for failure in self.actions.drain(Phase::Cleanup).await {
            self.record_teardown_failure("cleanup", failure);
        }

        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }
    }

    fn record_teardown_failure(&mut self, phase: &str, failure: super::actions::ActionFailure) {
        self.warn(Warning::teardown(format!(
            "{phase} action '{}' failed: {}",
            failure.label, failure.error
        )));
    }

    fn warn(&mut self, warning: Warning) {
        self.log.warn(&warning.message);
        self.diagnostics.warn(warning);
    }
}

/// Resolve on SIGINT or SIGTERM with the shell-convention exit code.
async fn shutdown_signal() -> (&'static str, i32) {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            _ = tokio::signal::ctrl_c() => ("SIGINT", 130),
            _ = term.recv() => ("SIGTERM", 143),
        },
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            ("SIGINT", 130)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_in_pipeline_order() {
        let names: Vec<&str> = Stage::SEQUENCE.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "locking",
                "platform-validation",
                "dependency-check",
                "backup",
                "fetch",
                "compile",
                "install",
                "module-load",
                "verification",
            ]
        );
    }

    #[test]
    fn rollback_triggers_from_backup_onward() {
        assert!(!Stage::Locking.triggers_rollback());
        assert!(!Stage::PlatformValidation.triggers_rollback());
        assert!(!Stage::DependencyCheck.triggers_rollback());
        for stage in [
            Stage::Backup,
            Stage::Fetch,
            Stage::Compile,
            Stage::Install,
            Stage::ModuleLoad,
            Stage::Verification,
        ] {
            assert!(stage.triggers_rollback(), "{} should roll back", stage.name());
        }
    }
}
