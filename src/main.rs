// ABOUTME: Entry point for the kmodeploy CLI application.
// ABOUTME: Parses flags, loads config, runs the deployer, and maps failures to exit codes.

mod cli;

use clap::Parser;
use cli::Cli;
use kmodeploy::config::Config;
use kmodeploy::deploy::Deployer;
use kmodeploy::host::HostRunner;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), kmodeploy::deploy::DeployError> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| kmodeploy::deploy::DeployError::Config(e.to_string()))?;
            Config::discover(&cwd)?
        }
    };

    let deployer = Deployer::new(config, HostRunner::new())?;
    let report = deployer.run().await?;

    if report.warnings.is_empty() {
        println!("Deployment complete!");
    } else {
        println!("Deployment complete with {} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            println!("  ! {}", warning.message);
        }
    }
    Ok(())
}
