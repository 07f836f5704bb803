//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `load_config` - Resolve the analysis configuration
//! - `load_ledger` - Read a normalized ledger CSV
//! - `cmd_config` - Print the effective configuration

use std::path::Path;

use anyhow::{Context, Result};
use spendlens_core::{AnalysisConfig, ConfigSource, CsvLedger, Ledger, LedgerProvider};

/// Load config from an explicit path, the data-dir override, or built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<(AnalysisConfig, ConfigSource)> {
    AnalysisConfig::load(path).context("Failed to load analysis config")
}

pub fn load_ledger(file: &Path) -> Result<Ledger> {
    let ledger = CsvLedger::new(file)
        .load()
        .with_context(|| format!("Failed to load ledger from {}", file.display()))?;
    if ledger.is_empty() {
        anyhow::bail!("No transactions found in {}", file.display());
    }
    Ok(ledger)
}

pub fn cmd_config(path: Option<&Path>) -> Result<()> {
    let (config, source) = load_config(path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;

    println!("# Source: {}", source);
    if let Some(override_path) = spendlens_core::config::default_config_path() {
        if !matches!(source, ConfigSource::Override(_)) {
            println!("# Override location: {}", override_path.display());
        }
    }
    println!();
    print!("{}", rendered);

    Ok(())
}
