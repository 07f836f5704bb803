//! Spendlens Core Library
//!
//! Analysis orchestration for personal financial insights:
//! - Ledger providers for normalized CSV and JSON transactions
//! - Data profiling and tool eligibility gates
//! - Analysis tools (temporal patterns, anomalies, subscriptions,
//!   correlations, spending impact and financial resilience)
//! - Concurrent tool fan-out with per-tool timeouts and progress streaming
//! - Cross-referencing, framing validation and ranking of insights
//! - Question routing to exact computations
//! - Optional narration through a local Ollama model

pub mod ask;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod import;
pub mod models;
pub mod narrative;
pub mod profile;
pub mod progress;
pub mod ranker;
pub mod stats;
pub mod synthesis;
pub mod tools;

/// Test utilities including synthetic ledgers and a mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ask::{AskResponse, AskRouter};
pub use config::{AnalysisConfig, ConfigSource};
pub use engine::{collect_stream, AnalysisEngine, AnalysisRun, SkippedTool};
pub use error::{Error, Result};
pub use gate::GateDecision;
pub use import::{parse_csv, CsvLedger, JsonLedger, LedgerProvider};
pub use models::{Confidence, Ledger, Transaction};
pub use narrative::{narrate_or_template, NarrationRequest, Narrator, OllamaNarrator, TemplateNarrator};
pub use profile::{Profile, Profiler};
pub use progress::ProgressEvent;
pub use synthesis::{Insight, SavingsPlan};
pub use tools::ToolKind;
