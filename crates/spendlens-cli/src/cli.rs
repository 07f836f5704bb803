//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Spendlens - Explainable insights from your transaction history
#[derive(Parser)]
#[command(name = "spendlens")]
#[command(about = "Analysis engine for personal financial insights", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Analysis config file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every eligible analysis and show ranked insights
    Analyze {
        /// Normalized ledger CSV (date, merchant, amount, category)
        #[arg(short, long)]
        file: PathBuf,

        /// Print the full analysis run as JSON
        #[arg(long)]
        json: bool,

        /// Number of top insights to show
        #[arg(long)]
        top: Option<usize>,
    },

    /// Run the analysis and print progress events as JSON lines
    Stream {
        /// Normalized ledger CSV
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the data profile of a ledger
    Profile {
        /// Normalized ledger CSV
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show which tools the ledger qualifies for, and why
    Gates {
        /// Normalized ledger CSV
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Ask a question about the ledger
    Ask {
        /// Normalized ledger CSV
        #[arg(short, long)]
        file: PathBuf,

        /// The question, e.g. "What if I cancel Netflix?"
        #[arg(short, long)]
        question: String,

        /// Narrate the answer with Ollama (requires OLLAMA_HOST)
        #[arg(long)]
        narrate: bool,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print the effective analysis configuration
    Config,
}
