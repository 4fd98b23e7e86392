#![allow(missing_docs)]

//! Solidstreak service binary.
//!
//! `start` runs the bot dispatcher and the Web App API; `migrate` applies the
//! database schema and exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use solidstreak::config::Config;
use solidstreak::logging;
use solidstreak::storage::sqlite;

#[derive(Parser)]
#[command(name = "solidstreak", version, about = "Habit tracker Telegram bot backend")]
struct Cli {
    /// Path to the config file (defaults to $SOLIDSTREAK_CONFIG or ./config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot dispatcher and the Web App API until Ctrl-C.
    Start,
    /// Apply the database schema and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Start => {
            config.validate()?;
            let _guard = match &config.logging.dir {
                Some(dir) => Some(logging::init_production(dir, &config.logging.level)?),
                None => {
                    logging::init_cli(&config.logging.level);
                    None
                }
            };
            info!(version = env!("CARGO_PKG_VERSION"), "solidstreak starting");
            solidstreak::app::run(config).await
        }
        Command::Migrate => {
            logging::init_cli(&config.logging.level);
            let pool = sqlite::connect(&config.database.url, 1)
                .await
                .context("failed to open database")?;
            sqlite::migrate(&pool)
                .await
                .context("failed to apply database schema")?;
            pool.close().await;
            info!(url = %config.database.url, "database schema applied");
            Ok(())
        }
    }
}
