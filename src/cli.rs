// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Flags only; the deployment target comes from configuration.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "kmodeploy")]
#[command(about = "Transactional installer for out-of-tree kernel driver modules")]
#[command(version)]
pub struct Cli {
    /// Enable verbose tracing
    #[arg(long)]
    pub debug: bool,

    /// Use an explicit configuration file instead of discovery
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
