//! Gate table: minimum-data requirements per analysis tool
//!
//! Decisions are pure functions of the profile. A tool with independent
//! sub-analyses (temporal, impact/resilience) reports each one as a
//! [`SubCheck`] so callers can see which parts actually ran.

use serde::Serialize;

use crate::config::GateConfig;
use crate::profile::Profile;
use crate::tools::ToolKind;

/// Temporal sub-analysis names
pub const PAYDAY: &str = "payday";
pub const WEEKLY: &str = "weekly";
pub const SEASONAL: &str = "seasonal";
/// Resilience sub-analysis needing detected income
pub const RUNWAY: &str = "runway";

/// Outcome of one sub-requirement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubCheck {
    pub name: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SubCheck {
    fn pass(name: &'static str) -> Self {
        Self {
            name,
            passed: true,
            reason: None,
        }
    }

    fn fail(name: &'static str, reason: String) -> Self {
        Self {
            name,
            passed: false,
            reason: Some(reason),
        }
    }

    fn check(name: &'static str, requirement: Option<String>) -> Self {
        match requirement {
            None => Self::pass(name),
            Some(reason) => Self::fail(name, reason),
        }
    }
}

/// Run/skip decision for one tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    pub tool_name: ToolKind,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_if_skipped: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_checks: Vec<SubCheck>,
}

impl GateDecision {
    fn new(tool: ToolKind, failure: Option<String>, sub_checks: Vec<SubCheck>) -> Self {
        Self {
            tool_name: tool,
            eligible: failure.is_none(),
            reason_if_skipped: failure,
            sub_checks,
        }
    }

    /// Whether a named sub-analysis may run. Tools without sub-checks pass.
    pub fn allows(&self, sub: &str) -> bool {
        self.eligible
            && self
                .sub_checks
                .iter()
                .find(|c| c.name == sub)
                .map(|c| c.passed)
                .unwrap_or(true)
    }

    /// Failed sub-checks of an eligible tool, as `(dotted_name, reason)`
    pub fn partial_skips(&self) -> Vec<(String, String)> {
        if !self.eligible {
            return vec![];
        }
        self.sub_checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| {
                (
                    format!("{}.{}", self.tool_name.name(), c.name),
                    c.reason.clone().unwrap_or_default(),
                )
            })
            .collect()
    }
}

/// Evaluate every tool's requirement, in canonical tool order
pub fn evaluate(profile: &Profile, config: &GateConfig) -> Vec<GateDecision> {
    ToolKind::all()
        .iter()
        .map(|tool| tool.is_eligible(profile, config))
        .collect()
}

/// Requirement check for a single tool
pub(crate) fn check(tool: ToolKind, profile: &Profile, config: &GateConfig) -> GateDecision {
    match tool {
        ToolKind::TemporalPatterns => {
            let payday = min_days(profile, config.payday_min_days).or_else(|| {
                (profile.income_deposit_count < config.payday_min_income_deposits).then(|| {
                    format!(
                        "Need {}+ income deposits, have {}",
                        config.payday_min_income_deposits, profile.income_deposit_count
                    )
                })
            });
            let weekly = (profile.total_spent <= 0.0)
                .then(|| "Need spending transactions, have none".to_string());
            let seasonal = min_months(profile, config.seasonal_min_months);

            let checks = vec![
                SubCheck::check(PAYDAY, payday),
                SubCheck::check(WEEKLY, weekly),
                SubCheck::check(SEASONAL, seasonal),
            ];
            let failure = if checks.iter().any(|c| c.passed) {
                None
            } else {
                Some(
                    checks
                        .iter()
                        .filter_map(|c| c.reason.as_deref())
                        .collect::<Vec<_>>()
                        .join("; "),
                )
            };
            GateDecision::new(tool, failure, checks)
        }
        ToolKind::AnomalyDetection => GateDecision::new(tool, None, vec![]),
        ToolKind::SubscriptionHunter => {
            let failure = (profile.repeated_charge_pairs == 0).then(|| {
                format!(
                    "Need a merchant+amount pair seen {}+ times, found none",
                    config.subscription_min_pair_occurrences
                )
            });
            GateDecision::new(tool, failure, vec![])
        }
        ToolKind::CorrelationEngine => {
            let failure = min_months(profile, config.correlation_min_months).or_else(|| {
                (profile.category_count < config.correlation_min_categories).then(|| {
                    format!(
                        "Need {}+ categories, have {}",
                        config.correlation_min_categories, profile.category_count
                    )
                })
            });
            GateDecision::new(tool, failure, vec![])
        }
        ToolKind::SpendingImpact => {
            let failure = min_months(profile, config.impact_min_months);
            let runway = (!profile.has_income).then(|| "No income detected".to_string());
            GateDecision::new(tool, failure, vec![SubCheck::check(RUNWAY, runway)])
        }
    }
}

fn min_months(profile: &Profile, needed: usize) -> Option<String> {
    (profile.months_count < needed)
        .then(|| format!("Need {}+ months, have {}", needed, profile.months_count))
}

fn min_days(profile: &Profile, needed: i64) -> Option<String> {
    (profile.date_range_days < needed)
        .then(|| format!("Need {}+ days, have {}", needed, profile.date_range_days))
}
