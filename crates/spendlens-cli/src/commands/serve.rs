//! Server command implementation

use anyhow::Result;
use spendlens_core::{AnalysisConfig, ConfigSource};

pub async fn cmd_serve(
    config: AnalysisConfig,
    source: &ConfigSource,
    host: &str,
    port: u16,
) -> Result<()> {
    let server_config = spendlens_server::ServerConfig::from_env();

    println!("🚀 Starting Spendlens web server...");
    println!("   Config: {}", source);
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Sessions: up to {}, expire after {} min idle",
        server_config.max_sessions,
        server_config.session_timeout.as_secs() / 60
    );
    if !server_config.allowed_origins.is_empty() {
        println!(
            "   CORS origins: {} (SPENDLENS_ALLOWED_ORIGINS)",
            server_config.allowed_origins.join(", ")
        );
    }
    println!();
    println!("   Press Ctrl+C to stop");

    spendlens_server::serve_with_config(config, host, port, server_config).await?;

    Ok(())
}
