mod config;
mod connector;
mod error;
mod feed;
mod index;
mod queue;
mod sink;
mod transform;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connector::Connector;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Changes-feed to search-index CDC connector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level filter (e.g. debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail the changes feed and index continuously until interrupted
    Run {
        /// Path to the configuration file
        #[arg(long, default_value = "sluice.toml")]
        config: PathBuf,
    },

    /// Validate a configuration file and print the resolved settings
    CheckConfig {
        #[arg(long, default_value = "sluice.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::CheckConfig { config } => {
            let cfg = config::load_config(&config)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let cfg = config::load_config(config_path)?;

    let connector = Connector::spawn(cfg, None).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("sluice: shutdown requested");

    connector.close();
    connector.join().await;
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
