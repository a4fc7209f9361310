// ABOUTME: Capability seam for host subprocess execution.
// ABOUTME: Defines CommandRunner, the production HostRunner, and host tool wrappers.

mod exec;
pub mod kmod;
pub mod pkg;
pub mod platform;

pub use exec::{CommandRunner, ExecError, ExecOutput, HostRunner};
