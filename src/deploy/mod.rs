// ABOUTME: Transactional deployment orchestration for kernel driver modules.
// ABOUTME: Exports the pipeline, lock, action stacks, retry policy, and error taxonomy.

mod actions;
mod backup;
mod error;
mod lock;
mod pipeline;
mod retry;

pub use actions::{ActionFailure, ActionStack, Phase};
pub use backup::{BackupRecord, ModuleBackup, RestoreError};
pub use error::{DeployError, DeployErrorKind};
pub use lock::{LockInfo, ProcessLock};
pub use pipeline::{Deployer, DeploymentContext, Report, Stage};
pub use retry::{Exhausted, RetryPolicy};
