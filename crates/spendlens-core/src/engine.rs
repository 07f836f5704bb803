//! Analysis engine - profiles, gates, fans out tools, synthesizes and ranks
//!
//! `run_analysis` and `stream_analysis` share one `execute` path and differ
//! only in where progress events go, so both produce the same run.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::gate::{self, GateDecision};
use crate::models::{Confidence, Ledger};
use crate::profile::{Profile, Profiler};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::ranker;
use crate::stats::round_to;
use crate::synthesis::{self, Insight, SavingsPlan};
use crate::tools::{ToolKind, ToolResult, ToolResults};

/// A tool (or sub-analysis) that did not contribute results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTool {
    pub name: String,
    pub reason: String,
}

/// Everything one analysis pass produced
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub profile: Profile,
    pub gate_decisions: Vec<GateDecision>,
    pub results: ToolResults,
    pub tool_confidence: BTreeMap<&'static str, Confidence>,
    pub insights: Vec<Insight>,
    pub all_insights: Vec<Insight>,
    pub savings_plan: SavingsPlan,
    pub tools_run: Vec<ToolKind>,
    pub tools_skipped: Vec<SkippedTool>,
    /// Wall-clock seconds
    pub execution_time: f64,
    pub ledger_fingerprint: String,
    #[serde(skip)]
    pub ledger: Arc<Ledger>,
}

impl AnalysisRun {
    pub fn ran(&self, tool: ToolKind) -> bool {
        self.tools_run.contains(&tool)
    }

    /// Skip reason for a tool or dotted sub-analysis name
    pub fn skip_reason(&self, name: &str) -> Option<&str> {
        self.tools_skipped
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.reason.as_str())
    }
}

enum ToolOutcome {
    Finished(ToolResult),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    config: Arc<AnalysisConfig>,
}

impl AnalysisEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Profile a ledger with this engine's gate thresholds
    pub fn profile(&self, ledger: &Ledger) -> Result<Profile> {
        Profiler::with_config(self.config.gates.clone()).profile(ledger)
    }

    /// Profile then run; a profiler failure aborts before any tool starts
    pub async fn analyze(&self, ledger: Arc<Ledger>) -> Result<AnalysisRun> {
        let profile = self.profile(&ledger)?;
        self.run_analysis(ledger, profile).await
    }

    /// Blocking view: run to completion and return the run
    pub async fn run_analysis(&self, ledger: Arc<Ledger>, profile: Profile) -> Result<AnalysisRun> {
        self.execute(ledger, profile, &ProgressSink::discard()).await
    }

    /// Streaming view: progress steps, then a done or error event
    pub fn stream_analysis(
        &self,
        ledger: Arc<Ledger>,
        profile: Profile,
    ) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(self.config.engine.progress_buffer.max(1));
        let engine = self.clone();
        tokio::spawn(async move {
            let sink = ProgressSink::channel(tx);
            let terminal = match engine.execute(ledger, profile, &sink).await {
                Ok(run) => ProgressEvent::done(run),
                Err(e) => {
                    warn!(error = %e, "Streaming analysis failed");
                    ProgressEvent::error(e.to_string())
                }
            };
            sink.emit(terminal).await;
        });
        rx
    }

    async fn execute(
        &self,
        ledger: Arc<Ledger>,
        profile: Profile,
        sink: &ProgressSink,
    ) -> Result<AnalysisRun> {
        let started = Instant::now();
        let budget = self.config.engine.run_budget();
        let deadline = tokio::time::Instant::now() + budget;

        sink.step(format!(
            "Profiled {} transactions across {} months",
            profile.transaction_count, profile.months_count
        ))
        .await;

        let decisions = gate::evaluate(&profile, &self.config.gates);
        let eligible: Vec<GateDecision> = decisions.iter().filter(|d| d.eligible).cloned().collect();
        sink.step(format!(
            "Gates evaluated: {} to run, {} skipped",
            eligible.len(),
            decisions.len() - eligible.len()
        ))
        .await;

        let profile = Arc::new(profile);
        let mut tasks = JoinSet::new();
        for decision in eligible {
            let tool = decision.tool_name;
            sink.step(format!("Running {}", tool)).await;

            let ledger = Arc::clone(&ledger);
            let profile = Arc::clone(&profile);
            let config = Arc::clone(&self.config);
            let tool_timeout = self.config.engine.tool_timeout();
            tasks.spawn(async move {
                let tool_started = Instant::now();
                let work = tokio::task::spawn_blocking(move || {
                    tool.run(&ledger, &profile, &config, &decision)
                });
                let outcome = match tokio::time::timeout(tool_timeout, work).await {
                    Ok(Ok(Ok(result))) => ToolOutcome::Finished(result),
                    Ok(Ok(Err(e))) => ToolOutcome::Failed(format!("Error: {}", e)),
                    Ok(Err(join_error)) if join_error.is_panic() => ToolOutcome::Failed(format!(
                        "Panicked: {}",
                        panic_message(join_error.into_panic())
                    )),
                    Ok(Err(join_error)) => ToolOutcome::Failed(format!("Error: {}", join_error)),
                    Err(_) => ToolOutcome::Failed(format!(
                        "Timed out after {} ms",
                        tool_timeout.as_millis()
                    )),
                };
                (tool, tool_started.elapsed(), outcome)
            });
        }

        let mut results = ToolResults::default();
        let mut failures: BTreeMap<ToolKind, String> = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((tool, elapsed, outcome)))) => {
                    let elapsed_ms = elapsed.as_millis() as u64;
                    match outcome {
                        ToolOutcome::Finished(result) => {
                            info!(tool = %tool, elapsed_ms, "Tool finished");
                            results.insert(result);
                            sink.step(format!("{} finished", tool)).await;
                        }
                        ToolOutcome::Failed(reason) => {
                            warn!(tool = %tool, elapsed_ms, %reason, "Tool failed; recording skip");
                            sink.step(format!("{} skipped: {}", tool, reason)).await;
                            failures.insert(tool, reason);
                        }
                    }
                }
                Ok(Some(Err(e))) => warn!(error = %e, "Tool task did not complete"),
                Ok(None) => break,
                Err(_) => {
                    warn!(budget_ms = budget.as_millis() as u64, "Run budget exhausted");
                    tasks.abort_all();
                    break;
                }
            }
        }

        let mut tools_run = vec![];
        let mut tools_skipped = vec![];
        for decision in &decisions {
            let tool = decision.tool_name;
            if !decision.eligible {
                tools_skipped.push(SkippedTool {
                    name: tool.name().to_string(),
                    reason: decision.reason_if_skipped.clone().unwrap_or_default(),
                });
            } else if results.contains(tool) {
                tools_run.push(tool);
                tools_skipped.extend(
                    decision
                        .partial_skips()
                        .into_iter()
                        .map(|(name, reason)| SkippedTool { name, reason }),
                );
            } else {
                let reason = failures.remove(&tool).unwrap_or_else(|| {
                    format!("Timed out: run budget of {} ms exhausted", budget.as_millis())
                });
                if reason.starts_with("Timed out: run budget") {
                    sink.step(format!("{} skipped: {}", tool, reason)).await;
                }
                tools_skipped.push(SkippedTool {
                    name: tool.name().to_string(),
                    reason,
                });
            }
        }

        sink.step("Cross-referencing findings").await;
        let synthesis = synthesis::synthesize(&results, &self.config.synthesis);

        sink.step("Ranking insights").await;
        let ranked = ranker::rank(synthesis.insights, self.config.synthesis.top_n);

        let profile = Arc::try_unwrap(profile).unwrap_or_else(|shared| (*shared).clone());
        let execution_time = round_to(started.elapsed().as_secs_f64(), 3);
        info!(
            tools_run = tools_run.len(),
            tools_skipped = tools_skipped.len(),
            insights = ranked.all.len(),
            execution_time,
            "Analysis complete"
        );
        debug!(fingerprint = %ledger.fingerprint(), "Run fingerprint");

        Ok(AnalysisRun {
            profile,
            gate_decisions: decisions,
            tool_confidence: results.confidence_map(),
            results,
            insights: ranked.top,
            all_insights: ranked.all,
            savings_plan: synthesis.savings_plan,
            tools_run,
            tools_skipped,
            execution_time,
            ledger_fingerprint: ledger.fingerprint(),
            ledger,
        })
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drain a progress stream, returning the steps and the terminal event
pub async fn collect_stream(
    mut rx: mpsc::Receiver<ProgressEvent>,
) -> (Vec<String>, Option<ProgressEvent>) {
    let mut steps = vec![];
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Step { step } => steps.push(step),
            terminal => return (steps, Some(terminal)),
        }
    }
    (steps, None)
}
