//! Analysis tools
//!
//! Five independent analyses that read the shared ledger and profile:
//! - `temporal` - payday, weekly and seasonal patterns
//! - `anomaly` - outliers, category spikes, new merchants
//! - `subscriptions` - recurring charges, price creep, overlaps
//! - `correlation` - pairwise monthly category correlation
//! - `impact` + `resilience` - variance attribution, runway and stress test
//!
//! [`ToolKind`] is the uniform handle the gate table and engine dispatch on.

pub mod anomaly;
pub mod correlation;
pub mod impact;
pub mod resilience;
pub mod subscriptions;
pub mod temporal;

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::{AnalysisConfig, GateConfig};
use crate::error::Result;
use crate::gate::{self, GateDecision};
use crate::models::{Confidence, Ledger};
use crate::profile::Profile;

pub use anomaly::AnomalyReport;
pub use correlation::CorrelationPair;
pub use impact::SpendingImpact;
pub use resilience::ResilienceReport;
pub use subscriptions::SubscriptionReport;
pub use temporal::TemporalReport;

/// The analysis tools, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    TemporalPatterns,
    AnomalyDetection,
    SubscriptionHunter,
    CorrelationEngine,
    SpendingImpact,
}

const ALL_TOOLS: [ToolKind; 5] = [
    ToolKind::TemporalPatterns,
    ToolKind::AnomalyDetection,
    ToolKind::SubscriptionHunter,
    ToolKind::CorrelationEngine,
    ToolKind::SpendingImpact,
];

impl ToolKind {
    pub fn all() -> &'static [ToolKind] {
        &ALL_TOOLS
    }

    /// Wire name, also the key under `results`
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::TemporalPatterns => "temporal_patterns",
            ToolKind::AnomalyDetection => "anomaly_detection",
            ToolKind::SubscriptionHunter => "subscription_hunter",
            ToolKind::CorrelationEngine => "correlation_engine",
            ToolKind::SpendingImpact => "spending_impact",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_TOOLS.iter().copied().find(|t| t.name() == name)
    }

    /// Position in canonical order
    pub fn order(&self) -> usize {
        *self as usize
    }

    /// Gate check for this tool
    pub fn is_eligible(&self, profile: &Profile, config: &GateConfig) -> GateDecision {
        gate::check(*self, profile, config)
    }

    /// Run the tool. `decision` says which sub-analyses may execute.
    pub fn run(
        &self,
        ledger: &Ledger,
        profile: &Profile,
        config: &AnalysisConfig,
        decision: &GateDecision,
    ) -> Result<ToolResult> {
        let (confidence, payload) = match self {
            ToolKind::TemporalPatterns => {
                let report = temporal::analyze(ledger, profile, &config.temporal, decision)?;
                (report.confidence(), ToolPayload::Temporal(report))
            }
            ToolKind::AnomalyDetection => {
                let report = anomaly::analyze(ledger, &config.anomaly)?;
                (report.confidence(), ToolPayload::Anomaly(report))
            }
            ToolKind::SubscriptionHunter => {
                let report = subscriptions::analyze(ledger, &config.subscriptions)?;
                (report.confidence(), ToolPayload::Subscriptions(report))
            }
            ToolKind::CorrelationEngine => {
                let pairs = correlation::analyze(ledger, &config.correlation)?;
                (
                    correlation::overall_confidence(&pairs),
                    ToolPayload::Correlation(pairs),
                )
            }
            ToolKind::SpendingImpact => {
                let spending_impact = impact::analyze(ledger, &config.impact)?;
                let financial_resilience =
                    resilience::analyze(ledger, profile, &config.resilience, decision)?;
                (
                    spending_impact.confidence,
                    ToolPayload::Impact(ImpactReport {
                        spending_impact,
                        financial_resilience,
                    }),
                )
            }
        };

        Ok(ToolResult {
            tool_source: *self,
            confidence,
            payload,
        })
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ToolKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Spending-impact tool output: the variance model plus resilience
#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub spending_impact: SpendingImpact,
    pub financial_resilience: ResilienceReport,
}

/// Tool-specific payload
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolPayload {
    Temporal(TemporalReport),
    Anomaly(AnomalyReport),
    Subscriptions(SubscriptionReport),
    Correlation(Vec<CorrelationPair>),
    Impact(ImpactReport),
}

/// One tool's output for a run
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub tool_source: ToolKind,
    pub confidence: Confidence,
    pub payload: ToolPayload,
}

/// Results of every tool that ran, keyed in canonical order
#[derive(Debug, Clone, Default)]
pub struct ToolResults {
    results: BTreeMap<ToolKind, ToolResult>,
}

impl ToolResults {
    pub fn insert(&mut self, result: ToolResult) {
        self.results.insert(result.tool_source, result);
    }

    pub fn get(&self, tool: ToolKind) -> Option<&ToolResult> {
        self.results.get(&tool)
    }

    pub fn contains(&self, tool: ToolKind) -> bool {
        self.results.contains_key(&tool)
    }

    pub fn tools(&self) -> impl Iterator<Item = ToolKind> + '_ {
        self.results.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn temporal(&self) -> Option<&TemporalReport> {
        match &self.get(ToolKind::TemporalPatterns)?.payload {
            ToolPayload::Temporal(r) => Some(r),
            _ => None,
        }
    }

    pub fn anomaly(&self) -> Option<&AnomalyReport> {
        match &self.get(ToolKind::AnomalyDetection)?.payload {
            ToolPayload::Anomaly(r) => Some(r),
            _ => None,
        }
    }

    pub fn subscriptions(&self) -> Option<&SubscriptionReport> {
        match &self.get(ToolKind::SubscriptionHunter)?.payload {
            ToolPayload::Subscriptions(r) => Some(r),
            _ => None,
        }
    }

    pub fn correlations(&self) -> Option<&[CorrelationPair]> {
        match &self.get(ToolKind::CorrelationEngine)?.payload {
            ToolPayload::Correlation(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn impact(&self) -> Option<&ImpactReport> {
        match &self.get(ToolKind::SpendingImpact)?.payload {
            ToolPayload::Impact(r) => Some(r),
            _ => None,
        }
    }

    /// Confidence per tool name
    pub fn confidence_map(&self) -> BTreeMap<&'static str, Confidence> {
        self.results
            .iter()
            .map(|(tool, result)| (tool.name(), result.confidence))
            .collect()
    }
}

impl Serialize for ToolResults {
    /// Emits `{tool_name: payload}` in canonical order. The impact tool is
    /// split into `spending_impact` and `financial_resilience` keys.
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let entries = self.results.len()
            + usize::from(self.results.contains_key(&ToolKind::SpendingImpact));
        let mut map = serializer.serialize_map(Some(entries))?;
        for (tool, result) in &self.results {
            match &result.payload {
                ToolPayload::Impact(report) => {
                    map.serialize_entry("spending_impact", &report.spending_impact)?;
                    map.serialize_entry("financial_resilience", &report.financial_resilience)?;
                }
                payload => map.serialize_entry(tool.name(), payload)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_and_names() {
        let names: Vec<&str> = ToolKind::all().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "temporal_patterns",
                "anomaly_detection",
                "subscription_hunter",
                "correlation_engine",
                "spending_impact"
            ]
        );
        assert!(ToolKind::TemporalPatterns < ToolKind::SpendingImpact);
        assert_eq!(ToolKind::CorrelationEngine.order(), 3);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            ToolKind::from_name("subscription_hunter"),
            Some(ToolKind::SubscriptionHunter)
        );
        assert_eq!(ToolKind::from_name("nope"), None);
        assert_eq!(
            serde_json::to_string(&ToolKind::AnomalyDetection).unwrap(),
            "\"anomaly_detection\""
        );
    }

    #[test]
    fn test_results_serialize_in_canonical_order() {
        let mut results = ToolResults::default();
        results.insert(ToolResult {
            tool_source: ToolKind::CorrelationEngine,
            confidence: Confidence::Medium,
            payload: ToolPayload::Correlation(vec![]),
        });
        results.insert(ToolResult {
            tool_source: ToolKind::AnomalyDetection,
            confidence: Confidence::Low,
            payload: ToolPayload::Anomaly(AnomalyReport::default()),
        });

        let json = serde_json::to_string(&results).unwrap();
        let anomaly_at = json.find("anomaly_detection").unwrap();
        let corr_at = json.find("correlation_engine").unwrap();
        assert!(anomaly_at < corr_at);
        assert_eq!(results.confidence_map()["correlation_engine"], Confidence::Medium);
        assert!(results.correlations().unwrap().is_empty());
        assert!(results.temporal().is_none());
    }
}
