use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use libcsi::Registry;
use rkvol::{Config, Module};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "rkvol", version, about = "Docker volume plugin and CSI storage agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent until SIGINT or SIGTERM
    Serve {
        /// Configuration file (YAML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Log output format
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// Load and validate a configuration, then print it
    CheckConfig {
        /// Configuration file (YAML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn load_config(path: Option<&Path>, registry: &Registry) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::parse("")?,
    };
    config.apply_env(std::env::vars())?;
    config.validate(registry)?;
    Ok(config)
}

async fn serve(config: Config, registry: Registry) -> anyhow::Result<()> {
    let running = Module::new(config, registry).start().await?;

    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to wait for SIGINT")?;
            info!("received SIGINT, shutting down");
        }
        _ = terminate.recv() => info!("received SIGTERM, shutting down"),
    }

    running.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let registry = Registry::builtin();

    match cli.command {
        Command::Serve { config, log_format } => {
            init_tracing(log_format);
            let config = load_config(config.as_deref(), &registry)?;
            serve(config, registry).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(config.as_deref(), &registry)?;
            print!("{}", serde_yaml::to_string(&config)?);
            println!("# effective docker mode: {}", config.effective_mode());
            Ok(())
        }
    }
}
