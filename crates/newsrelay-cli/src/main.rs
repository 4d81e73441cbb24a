use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsrelay_core::config::MAX_INTERVAL_HOURS;
use newsrelay_core::{build_runner, AppConfig, Database};

mod commands;

#[derive(Parser)]
#[command(name = "newsrelay")]
#[command(author, version, about = "Relay new articles from news sites to a Telegram channel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file (default: ~/.config/newsrelay/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single cycle and exit
    Once,
    /// Run continuously on a fixed interval (default)
    Run {
        /// Hours between cycle starts (overrides schedule.interval_hours)
        #[arg(long = "every", value_name = "HOURS", value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_HOURS))]
        every: Option<u64>,
    },
    /// Show publishing history and check the Telegram connection
    Status,
}

fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration; this is the only fatal failure
    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    init_logging(&config.general.log_level);

    let db = Database::new(&config).await?;

    match cli.command.unwrap_or(Commands::Run { every: None }) {
        Commands::Once => {
            let runner = build_runner(&config, db)?;
            commands::once::run(&runner).await
        }
        Commands::Run { every } => {
            let runner = Arc::new(build_runner(&config, db)?);
            let interval = every
                .map(|hours| Duration::from_secs(hours.saturating_mul(3600)))
                .unwrap_or_else(|| config.schedule.interval());
            commands::run::run(runner, interval).await
        }
        Commands::Status => commands::status::run(db, &config).await,
    }
}
