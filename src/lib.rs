// ABOUTME: Library root for kmodeploy - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod host;
pub mod logfile;
