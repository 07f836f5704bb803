//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (load_config, load_ledger) and the config command
//! - `analyze` - Analysis commands (analyze, stream, profile, gates)
//! - `ask` - Question answering with optional narration
//! - `serve` - Web server command

pub mod analyze;
pub mod ask;
pub mod core;
pub mod serve;

// Re-export command functions for main.rs
pub use analyze::*;
pub use ask::*;
pub use core::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
