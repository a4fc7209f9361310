// ABOUTME: Configuration types and parsing for kmodeploy.yml.
// ABOUTME: Compiled defaults target the 8812au driver; a YAML file overrides them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::deploy::DeployError;

pub const CONFIG_FILENAME: &str = "kmodeploy.yml";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/kmodeploy.yml";

/// Everything the deployment pipeline needs to know about one driver target
/// and the host paths it may touch.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DKMS package name of the driver.
    pub driver: String,

    /// Kernel module name as seen by modprobe/lsmod.
    pub module: String,

    /// Driver version, used for the `<driver>/<version>` DKMS spec.
    pub version: String,

    /// Git repository holding the driver source.
    pub source_repo: String,

    /// Build tools that must be present, as `[command, package]` pairs.
    pub required_tools: Vec<(String, String)>,

    /// CPU architectures the build is supported on.
    pub supported_architectures: Vec<String>,

    /// Single-instance lock file.
    pub lock_file: PathBuf,

    /// Append-only run log.
    pub log_file: PathBuf,

    /// Root directory for per-run backups.
    pub backup_root: PathBuf,

    /// Attempts for the source fetch.
    pub fetch_attempts: u32,

    /// Base delay for linear fetch backoff.
    #[serde(with = "humantime_serde")]
    pub fetch_base_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: "rtl8812au".to_string(),
            module: "8812au".to_string(),
            version: "5.6.4.2".to_string(),
            source_repo: "https://github.com/aircrack-ng/rtl8812au.git".to_string(),
            required_tools: vec![
                ("git".to_string(), "git".to_string()),
                ("make".to_string(), "make".to_string()),
                ("gcc".to_string(), "gcc".to_string()),
                ("dkms".to_string(), "dkms".to_string()),
            ],
            supported_architectures: crate::host::platform::SUPPORTED_ARCHITECTURES
                .iter()
                .map(|a| a.to_string())
                .collect(),
            lock_file: PathBuf::from("/run/lock/kmodeploy.lock"),
            log_file: PathBuf::from("/var/log/kmodeploy.log"),
            backup_root: PathBuf::from("/var/backups/kmodeploy"),
            fetch_attempts: 3,
            fetch_base_delay: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| DeployError::Config(format!("invalid config '{}': {e}", path.display())))
    }

    /// Discover configuration: `kmodeploy.yml` in `dir`, then the system
    /// path, then compiled defaults.
    pub fn discover(dir: &Path) -> Result<Self, DeployError> {
        let local = dir.join(CONFIG_FILENAME);
        if local.is_file() {
            return Self::load(&local);
        }
        let system = Path::new(SYSTEM_CONFIG_PATH);
        if system.is_file() {
            return Self::load(system);
        }
        Ok(Self::default())
    }

    /// Packages backing the required tools that are missing on the host,
    /// deduplicated while keeping the configured order.
    pub fn packages_for(&self, missing: &[&(String, String)]) -> Vec<String> {
        let mut packages: Vec<String> = Vec::new();
        for (_, pkg) in missing {
            if !packages.iter().any(|p| p == pkg) {
                packages.push(pkg.clone());
            }
        }
        packages
    }
}
