//! Spendlens CLI - Analysis orchestration for personal finance
//!
//! Usage:
//!   spendlens analyze --file CSV          Run the analysis and show insights
//!   spendlens stream --file CSV           Progress events as JSON lines
//!   spendlens ask --file CSV -q QUESTION  Answer a question from the analysis
//!   spendlens serve --port 3000           Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Analyze { file, json, top } => {
            let (config, _) = commands::load_config(config_path)?;
            commands::cmd_analyze(config, &file, json, top).await
        }
        Commands::Stream { file } => {
            let (config, _) = commands::load_config(config_path)?;
            commands::cmd_stream(config, &file).await
        }
        Commands::Profile { file } => {
            let (config, _) = commands::load_config(config_path)?;
            commands::cmd_profile(&config, &file)
        }
        Commands::Gates { file } => {
            let (config, _) = commands::load_config(config_path)?;
            commands::cmd_gates(&config, &file)
        }
        Commands::Ask {
            file,
            question,
            narrate,
        } => {
            let (config, _) = commands::load_config(config_path)?;
            commands::cmd_ask(config, &file, &question, narrate).await
        }
        Commands::Serve { port, host } => {
            let (config, source) = commands::load_config(config_path)?;
            commands::cmd_serve(config, &source, &host, port).await
        }
        Commands::Config => commands::cmd_config(config_path),
    }
}
