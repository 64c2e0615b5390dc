use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use procvisor::services::{self, DEFAULT_CONFIG_PATH};
use procvisor::{logging, Supervisor, SupervisorConfig};

/// Compose-style supervisor for plain processes.
#[derive(Parser)]
#[command(name = "procvisor", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start every service declared in the services file.
    Start {
        /// Path to the services file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Log filter (e.g. `debug`, `procvisor=trace`); overrides RUST_LOG.
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Start { config, log_level } => start(config, log_level.as_deref()).await,
    }
}

async fn start(config: PathBuf, log_level: Option<&str>) -> ExitCode {
    if let Err(e) = logging::init(log_level) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    let fleet = match services::load(&config) {
        Ok(fleet) => fleet,
        Err(e) => {
            println!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match supervise(fleet).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn supervise(
    fleet: std::collections::BTreeMap<String, procvisor::ServiceSpec>,
) -> anyhow::Result<()> {
    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_service_map(fleet)
        .build()
        .await
        .context("invalid fleet")?;

    sup.spawn_signal_observer();
    sup.run().await?;
    Ok(())
}
