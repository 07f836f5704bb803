//! Cross-referencing tool findings into insights
//!
//! Findings are offered in a fixed priority order. A dollar-bearing finding
//! claims its subjects (merchants and categories); a later finding about an
//! already-claimed subject is folded into the earlier insight's `related`
//! list instead of carrying its own dollar figure. Each insight therefore
//! has exactly one `tool_source` for its dollars.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::SynthesisConfig;
use crate::models::{
    is_discretionary, is_essential, normalize_merchant, Confidence, ESSENTIAL_CATEGORIES,
};
use crate::stats::round_to;
use crate::tools::anomaly::Recurrence;
use crate::tools::resilience::RunwayStatus;
use crate::tools::{ToolKind, ToolResults};

/// Words and phrases that never appear in user-facing text
pub const BANNED_WORDS: &[&str] = &[
    "should",
    "bad",
    "problem",
    "waste",
    "too much",
    "excessive",
    "avoid",
    "excess",
    "splurge",
    "cut back",
    "habit",
    "frequent",
    "overspend",
    "reckless",
    "irresponsible",
    "guilty",
    "alarming",
    "variance",
    "standard deviation",
    "coefficient",
    "regression",
    "percentile",
    "volatility",
    "burn rate",
];

const REDUCTION_VERBS: &[&str] = &[
    "reduce", "reducing", "cut", "cutting", "lower", "lowering", "trim", "trimming",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub rank: usize,
    pub title: String,
    pub description: String,
    /// Annualized dollars; one-time for outliers, 0 for observations
    pub dollar_impact: f64,
    pub confidence: Confidence,
    pub tool_source: ToolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_option: Option<String>,
    pub canonical_key: String,
    /// Keys of findings folded into this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
}

impl Insight {
    pub fn new(
        tool_source: ToolKind,
        canonical_key: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        dollar_impact: f64,
        confidence: Confidence,
    ) -> Self {
        Self {
            rank: 0,
            title: title.into(),
            description: description.into(),
            dollar_impact: round_to(dollar_impact.max(0.0), 2),
            confidence,
            tool_source,
            action_option: None,
            canonical_key: canonical_key.into(),
            related: vec![],
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_option = Some(action.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Overlap,
    PriceCreep,
    DiscretionaryCut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsOpportunity {
    pub title: String,
    pub annual_savings: f64,
    pub detail: String,
    pub kind: OpportunityKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SavingsPlan {
    pub total_annual_savings: f64,
    pub opportunities: Vec<SavingsOpportunity>,
}

/// Unranked insights plus the savings plan built from the same findings
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub insights: Vec<Insight>,
    pub savings_plan: SavingsPlan,
}

/// Check text against the framing rules
///
/// Fails on any banned word, or on a reduction verb aimed at an essential
/// category ("cut groceries", "reduce your rent").
pub fn validate_framing(text: &str) -> std::result::Result<(), String> {
    validate_framing_with(text, &[])
}

/// [`validate_framing`] with merchant and category names masked out
///
/// A name is data, not wording: "WASTE MANAGEMENT went up" passes when
/// "WASTE MANAGEMENT" is listed. Essential categories are never masked so
/// "cut Groceries" still fails.
pub fn validate_framing_with(text: &str, names: &[&str]) -> std::result::Result<(), String> {
    check_tokens(&mask_names(tokenize(text), &entity_tokens(names.iter().copied())))
}

fn check_tokens(tokens: &[String]) -> std::result::Result<(), String> {
    let padded = format!(" {} ", tokens.join(" "));

    for word in BANNED_WORDS {
        if padded.contains(&format!(" {} ", word)) {
            return Err(format!("banned word: {}", word));
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if !REDUCTION_VERBS.contains(&token.as_str()) {
            continue;
        }
        let window: Vec<&str> = tokens[i + 1..].iter().take(3).map(String::as_str).collect();
        let following = format!(" {} ", window.join(" "));
        for essential in ESSENTIAL_CATEGORIES {
            let first = tokenize(essential).into_iter().next().unwrap_or_default();
            if !first.is_empty() && following.contains(&format!(" {} ", first)) {
                return Err(format!("suggests reducing essential category: {}", essential));
            }
        }
    }
    Ok(())
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokenized names, longest first, skipping essential categories
fn entity_tokens<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = names
        .into_iter()
        .filter(|name| !is_essential(name))
        .map(tokenize)
        .filter(|tokens| !tokens.is_empty())
        .collect();
    out.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    out.dedup();
    out
}

fn mask_names(tokens: Vec<String>, names: &[Vec<String>]) -> Vec<String> {
    if names.is_empty() {
        return tokens;
    }
    let mut masked = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        match names.iter().find(|name| tokens[i..].starts_with(name.as_slice())) {
            Some(name) => {
                masked.push("name".to_string());
                i += name.len();
            }
            None => {
                masked.push(tokens[i].clone());
                i += 1;
            }
        }
    }
    masked
}

/// Every merchant and category a tool report can put into insight text
fn entity_names(results: &ToolResults) -> Vec<&str> {
    let mut names = Vec::new();
    if let Some(report) = results.subscriptions() {
        for charge in &report.recurring {
            names.push(charge.merchant.as_str());
            names.push(charge.category.as_str());
        }
        names.extend(report.price_creep.iter().map(|c| c.merchant.as_str()));
        for overlap in &report.overlaps {
            names.push(overlap.category.as_str());
            names.push(overlap.keep.as_str());
            names.extend(overlap.subscriptions.iter().map(|m| m.merchant.as_str()));
        }
    }
    if let Some(report) = results.anomaly() {
        for outlier in &report.outliers {
            names.push(outlier.merchant.as_str());
            names.push(outlier.category.as_str());
        }
        names.extend(report.spending_spikes.iter().map(|s| s.category.as_str()));
        for merchant in &report.new_merchants {
            names.push(merchant.merchant.as_str());
            names.push(merchant.category.as_str());
        }
    }
    if let Some(pairs) = results.correlations() {
        for pair in pairs {
            names.push(pair.category_a.as_str());
            names.push(pair.category_b.as_str());
        }
    }
    if let Some(impact) = results.impact() {
        names.extend(
            impact
                .spending_impact
                .impacts
                .iter()
                .map(|i| i.category.as_str()),
        );
        if let Some(stress) = &impact.financial_resilience.stress_test {
            names.extend(stress.categories_to_cut.iter().map(|c| c.category.as_str()));
        }
    }
    names
}

/// Whole dollars with thousands separators; cents below $100
pub fn money(amount: f64) -> String {
    if amount.abs() < 100.0 {
        return format!("${:.2}", amount);
    }
    let whole = amount.abs().round() as u64;
    let digits = whole.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if amount < 0.0 {
        format!("-${}", out)
    } else {
        format!("${}", out)
    }
}

fn merchant_subject(merchant: &str) -> String {
    format!("merchant:{}", normalize_merchant(merchant))
}

fn category_subject(category: &str) -> String {
    format!("category:{}", category.trim().to_lowercase())
}

#[derive(Default)]
struct CrossReferencer {
    /// Entity names masked out before framing checks
    names: Vec<Vec<String>>,
    insights: Vec<Insight>,
    claims: BTreeMap<String, usize>,
    keys: BTreeSet<(ToolKind, String)>,
}

impl CrossReferencer {
    fn new(results: &ToolResults) -> Self {
        Self {
            names: entity_tokens(entity_names(results)),
            ..Self::default()
        }
    }

    fn check_framing(&self, text: &str) -> std::result::Result<(), String> {
        check_tokens(&mask_names(tokenize(text), &self.names))
    }

    fn offer(&mut self, insight: Insight, subjects: &[String]) {
        if insight.dollar_impact > 0.0 {
            if let Some(owner) = subjects.iter().find_map(|s| self.claims.get(s).copied()) {
                tracing::debug!(
                    key = %insight.canonical_key,
                    owner = %self.insights[owner].canonical_key,
                    "Folding finding into earlier insight"
                );
                self.insights[owner].related.push(insight.canonical_key);
                return;
            }
        }

        if !self
            .keys
            .insert((insight.tool_source, insight.canonical_key.clone()))
        {
            return;
        }

        let text = format!("{} {}", insight.title, insight.description);
        let action = insight.action_option.as_deref().unwrap_or_default();
        if let Err(reason) = self
            .check_framing(&text)
            .and_then(|_| self.check_framing(action))
        {
            tracing::warn!(key = %insight.canonical_key, %reason, "Dropping insight that failed framing");
            return;
        }

        let index = self.insights.len();
        if insight.dollar_impact > 0.0 {
            for subject in subjects {
                self.claims.entry(subject.clone()).or_insert(index);
            }
        }
        self.insights.push(insight);
    }
}

/// Turn tool results into deduplicated insights and a savings plan
pub fn synthesize(results: &ToolResults, config: &SynthesisConfig) -> Synthesis {
    let mut xref = CrossReferencer::new(results);

    subscription_findings(results, &mut xref);
    spike_findings(results, &mut xref);
    driver_findings(results, config, &mut xref);
    new_merchant_findings(results, &mut xref);
    outlier_findings(results, config, &mut xref);
    portfolio_finding(results, &mut xref);
    runway_finding(results, &mut xref);
    compound_findings(results, config, &mut xref);

    let savings_plan = savings_plan(&xref.insights, config);
    tracing::debug!(
        insights = xref.insights.len(),
        savings = savings_plan.total_annual_savings,
        "Cross-referencing complete"
    );
    Synthesis {
        insights: xref.insights,
        savings_plan,
    }
}

fn subscription_findings(results: &ToolResults, xref: &mut CrossReferencer) {
    let Some(report) = results.subscriptions() else {
        return;
    };

    for overlap in report.overlaps.iter().filter(|o| o.potential_savings > 0.0) {
        let names: Vec<&str> = overlap
            .subscriptions
            .iter()
            .map(|m| m.merchant.as_str())
            .collect();
        let confidence = if overlap
            .subscriptions
            .iter()
            .filter_map(|m| report.find(&m.merchant))
            .all(|c| c.confidence == Confidence::High)
        {
            Confidence::High
        } else {
            Confidence::Medium
        };
        let mut subjects: Vec<String> = names.iter().map(|m| merchant_subject(m)).collect();
        subjects.push(format!("overlap:{}", overlap.category.to_lowercase()));

        let insight = Insight::new(
            ToolKind::SubscriptionHunter,
            format!("overlap:{}", overlap.category.to_lowercase()),
            format!("{} {} services", overlap.count, overlap.category),
            format!(
                "You pay for {} {} services ({}) totalling {}/yr. Keeping only {} would free up {}/yr.",
                overlap.count,
                overlap.category,
                names.join(", "),
                money(overlap.combined_annual),
                overlap.keep,
                money(overlap.potential_savings)
            ),
            overlap.potential_savings,
            confidence,
        )
        .with_action(format!("Keep {} and pause the others", overlap.keep));
        xref.offer(insight, &subjects);
    }

    for creep in report.price_creep.iter().filter(|c| c.annual_cost_increase > 0.0) {
        let confidence = report
            .find(&creep.merchant)
            .map(|c| c.confidence)
            .unwrap_or(Confidence::Medium);
        let insight = Insight::new(
            ToolKind::SubscriptionHunter,
            format!("price_creep:{}", creep.merchant),
            format!("{} price went up {:.0}%", creep.merchant, creep.total_increase_pct),
            format!(
                "{} went from {} to {}, adding {}/yr compared with the original price.",
                creep.merchant,
                money(creep.original_price),
                money(creep.current_price),
                money(creep.annual_cost_increase)
            ),
            creep.annual_cost_increase,
            confidence,
        )
        .with_action(format!("Check whether a cheaper {} plan fits your needs", creep.merchant));
        xref.offer(insight, &[merchant_subject(&creep.merchant)]);
    }
}

fn spike_findings(results: &ToolResults, xref: &mut CrossReferencer) {
    let Some(report) = results.anomaly() else {
        return;
    };
    for spike in &report.spending_spikes {
        let annual = (spike.recent_month_total - spike.prior_avg) * 12.0;
        let confidence = if spike.months_compared >= 3 {
            Confidence::High
        } else {
            Confidence::Medium
        };
        let label = spike.recent_month.label();
        let insight = Insight::new(
            ToolKind::AnomalyDetection,
            format!("spike:{}", spike.category.to_lowercase()),
            format!("{} jumped {:.0}% in {}", spike.category, spike.spike_pct, label),
            format!(
                "{} reached {} in {} against a {}/month average before. Staying at that level adds {}/yr.",
                spike.category,
                money(spike.recent_month_total),
                label,
                money(spike.prior_avg),
                money(annual)
            ),
            annual,
            confidence,
        )
        .with_action(format!("Look over {} purchases from {}", spike.category, label));
        xref.offer(insight, &[category_subject(&spike.category)]);
    }
}

fn driver_findings(results: &ToolResults, config: &SynthesisConfig, xref: &mut CrossReferencer) {
    let Some(impact) = results.impact() else {
        return;
    };
    let model = &impact.spending_impact;
    if !model.model_valid {
        return;
    }
    let share = config.discretionary_cut_pct / 100.0;
    for driver in model
        .impacts
        .iter()
        .filter(|i| i.impact_pct > 0.0 && is_discretionary(&i.category))
    {
        let annual = driver.monthly_avg * share * 12.0;
        let insight = Insight::new(
            ToolKind::SpendingImpact,
            format!("driver:{}", driver.category.to_lowercase()),
            format!(
                "{} drives {:.0}% of your month-to-month swings",
                driver.category, driver.impact_pct
            ),
            format!(
                "{} averages {}/month. Trimming it by {:.0}% would keep {}/yr in your pocket.",
                driver.category,
                money(driver.monthly_avg),
                config.discretionary_cut_pct,
                money(annual)
            ),
            annual,
            model.confidence,
        )
        .with_action(format!(
            "Try a {} budget of {}/month",
            driver.category,
            money(driver.monthly_avg * (1.0 - share))
        ));
        xref.offer(insight, &[category_subject(&driver.category)]);
    }
}

fn new_merchant_findings(results: &ToolResults, xref: &mut CrossReferencer) {
    let Some(report) = results.anomaly() else {
        return;
    };
    for merchant in &report.new_merchants {
        let per_year = match merchant.recurrence {
            Recurrence::OneOff => continue,
            Recurrence::Weekly => 52.0,
            Recurrence::Monthly | Recurrence::Repeating => 12.0,
        };
        let annual = merchant.avg_amount * per_year;
        let insight = Insight::new(
            ToolKind::AnomalyDetection,
            format!("new_merchant:{}", normalize_merchant(&merchant.merchant)),
            format!("New recurring spend at {}", merchant.merchant),
            format!(
                "{} first appeared on {} and has charged {} times at about {} each, roughly {}/yr at this pace.",
                merchant.merchant,
                merchant.first_seen,
                merchant.occurrences,
                money(merchant.avg_amount),
                money(annual)
            ),
            annual,
            Confidence::Medium,
        );
        xref.offer(insight, &[merchant_subject(&merchant.merchant)]);
    }
}

fn outlier_findings(results: &ToolResults, config: &SynthesisConfig, xref: &mut CrossReferencer) {
    let Some(report) = results.anomaly() else {
        return;
    };
    for outlier in report.outliers.iter().take(config.max_outlier_insights) {
        let excess_over_typical = outlier.amount - outlier.category_median;
        let insight = Insight::new(
            ToolKind::AnomalyDetection,
            format!(
                "outlier:{}:{}",
                normalize_merchant(&outlier.merchant),
                outlier.date
            ),
            format!("Unusual {} purchase at {}", outlier.category, outlier.merchant),
            format!(
                "{} at {} on {} is well above your typical {} {} purchase.",
                money(outlier.amount),
                outlier.merchant,
                outlier.date,
                money(outlier.category_median),
                outlier.category
            ),
            excess_over_typical,
            outlier.confidence,
        );
        xref.offer(
            insight,
            &[format!(
                "outlier:{}:{}",
                normalize_merchant(&outlier.merchant),
                outlier.date
            )],
        );
    }
}

fn portfolio_finding(results: &ToolResults, xref: &mut CrossReferencer) {
    let Some(report) = results.subscriptions() else {
        return;
    };
    let Some(largest) = report.recurring.first() else {
        return;
    };
    let total = report.total_annual();
    let insight = Insight::new(
        ToolKind::SubscriptionHunter,
        "portfolio",
        format!(
            "{} recurring charges add up to {}/yr",
            report.recurring.len(),
            money(total)
        ),
        format!(
            "Your recurring charges total {} a year. The largest is {} at {}/yr.",
            money(total),
            largest.merchant,
            money(largest.annual_cost)
        ),
        0.0,
        report.confidence(),
    )
    .with_action("Review the list once a quarter");
    xref.offer(insight, &[]);
}

fn runway_finding(results: &ToolResults, xref: &mut CrossReferencer) {
    let Some(impact) = results.impact() else {
        return;
    };
    let resilience = &impact.financial_resilience;
    let Some(runway) = &resilience.runway else {
        return;
    };
    let confidence = if runway.months_of_runway < 6.0 {
        Confidence::High
    } else {
        Confidence::Medium
    };
    let (title, description) = match runway.status {
        RunwayStatus::Surplus => (
            format!(
                "Savings cover about {:.1} months of spending",
                runway.months_of_runway
            ),
            format!(
                "Income runs {}/month ahead of spending. If income stopped, about {} in savings would last {:.1} months at {}/month.",
                money(runway.net_monthly),
                money(runway.estimated_savings),
                runway.months_of_runway,
                money(runway.monthly_burn)
            ),
        ),
        RunwayStatus::Deficit => (
            format!(
                "Spending runs {}/month ahead of income",
                money(-runway.net_monthly)
            ),
            format!(
                "Monthly spending of {} is above monthly income of {}. Savings of {} cover the gap for about {:.1} months.",
                money(runway.monthly_burn),
                money(runway.monthly_income),
                money(runway.estimated_savings),
                runway.months_of_runway
            ),
        ),
    };
    let mut insight = Insight::new(
        ToolKind::SpendingImpact,
        "runway",
        title,
        description,
        0.0,
        confidence,
    );
    if let Some(stress) = &resilience.stress_test {
        insight = insight.with_action(format!(
            "A leaner budget of {}/month would stretch savings further",
            money(stress.revised_monthly_budget)
        ));
    }
    xref.offer(insight, &[]);
}

fn compound_findings(results: &ToolResults, config: &SynthesisConfig, xref: &mut CrossReferencer) {
    let top_driver = results.impact().and_then(|i| {
        let model = &i.spending_impact;
        model
            .model_valid
            .then(|| model.impacts.iter().find(|c| is_discretionary(&c.category)))
            .flatten()
    });

    if let Some(temporal) = results.temporal() {
        if let Some(payday) = temporal.payday.as_ref().filter(|p| p.payday_detected) {
            let mut description = format!(
                "{:.0}% of your flexible spending lands in the 7 days after payday.",
                payday.spending_in_first_7_days_pct
            );
            if let Some(driver) = top_driver {
                description.push_str(&format!(
                    " {} is the category that moves your monthly total most.",
                    driver.category
                ));
            }
            let insight = Insight::new(
                ToolKind::TemporalPatterns,
                "payday",
                "Spending clusters right after payday",
                description,
                0.0,
                payday.confidence,
            )
            .with_action("Move a set amount to savings on payday");
            xref.offer(insight, &[]);
        }

        if let Some(weekly) = temporal
            .weekly
            .as_ref()
            .filter(|w| w.weekend_spending_multiple > config.weekend_multiple_threshold)
        {
            let insight = Insight::new(
                ToolKind::TemporalPatterns,
                "weekend",
                format!(
                    "Weekend purchases run {:.1}x weekday ones",
                    weekly.weekend_spending_multiple
                ),
                format!(
                    "A typical weekend purchase is {} against {} on weekdays. {} is your highest-spend day.",
                    money(weekly.weekend_avg),
                    money(weekly.weekday_avg),
                    weekly.highest_spending_day
                ),
                0.0,
                Confidence::Medium,
            );
            xref.offer(insight, &[]);
        }
    }

    let Some(pairs) = results.correlations() else {
        return;
    };

    if let Some(anomaly) = results.anomaly() {
        for spike in &anomaly.spending_spikes {
            let Some((pair, partner)) = pairs
                .iter()
                .find_map(|p| p.partner_of(&spike.category).map(|partner| (p, partner)))
            else {
                continue;
            };
            let direction = if pair.correlation > 0.0 {
                "tend to rise and fall together"
            } else {
                "tend to move in opposite directions"
            };
            let insight = Insight::new(
                ToolKind::CorrelationEngine,
                format!("spike_link:{}", spike.category.to_lowercase()),
                format!("{} jump may ripple into {}", spike.category, partner),
                format!(
                    "{} and {} {}, so the {} change in {} is likely to show up in {} too.",
                    spike.category,
                    partner,
                    direction,
                    spike.recent_month.label(),
                    spike.category,
                    partner
                ),
                0.0,
                pair.confidence,
            );
            xref.offer(insight, &[]);
        }
    }

    for pair in pairs.iter().take(config.max_correlation_insights) {
        let insight = Insight::new(
            ToolKind::CorrelationEngine,
            format!(
                "correlation:{}:{}",
                pair.category_a.to_lowercase(),
                pair.category_b.to_lowercase()
            ),
            format!("{} and {} are linked", pair.category_a, pair.category_b),
            pair.interpretation.clone(),
            0.0,
            pair.confidence,
        );
        xref.offer(insight, &[]);
    }
}

fn savings_plan(insights: &[Insight], config: &SynthesisConfig) -> SavingsPlan {
    let mut opportunities: Vec<SavingsOpportunity> = insights
        .iter()
        .filter_map(|i| {
            let kind = match i.canonical_key.split(':').next()? {
                "overlap" => OpportunityKind::Overlap,
                "price_creep" if i.dollar_impact > config.min_creep_savings => {
                    OpportunityKind::PriceCreep
                }
                "driver" => OpportunityKind::DiscretionaryCut,
                _ => return None,
            };
            Some(SavingsOpportunity {
                title: i.title.clone(),
                annual_savings: i.dollar_impact,
                detail: i.action_option.clone().unwrap_or_else(|| i.description.clone()),
                kind,
            })
        })
        .collect();
    opportunities.sort_by(|a, b| {
        b.annual_savings
            .total_cmp(&a.annual_savings)
            .then_with(|| a.title.cmp(&b.title))
    });
    opportunities.truncate(5);

    SavingsPlan {
        total_annual_savings: round_to(opportunities.iter().map(|o| o.annual_savings).sum(), 2),
        opportunities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::YearMonth;
    use crate::tools::anomaly::SpendingSpike;
    use crate::tools::subscriptions::{Frequency, Overlap, OverlapMember, PriceCreep, RecurringCharge};
    use crate::tools::{AnomalyReport, SubscriptionReport, ToolPayload, ToolResult};
    use chrono::NaiveDate;

    fn charge(merchant: &str, amount: f64) -> RecurringCharge {
        RecurringCharge {
            merchant: merchant.into(),
            category: "Subscriptions".into(),
            frequency: Frequency::Monthly,
            amount,
            occurrences: 6,
            annual_cost: amount * 12.0,
            first_charge: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            last_charge: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            confidence: Confidence::High,
            price_creep_ref: None,
            overlap_ref: Some("Streaming".into()),
        }
    }

    fn streaming_results() -> ToolResults {
        let report = SubscriptionReport {
            recurring: vec![charge("NETFLIX", 15.49), charge("HULU", 7.99)],
            price_creep: vec![PriceCreep {
                merchant: "NETFLIX".into(),
                price_creep_detected: true,
                original_price: 12.99,
                current_price: 15.49,
                total_increase_pct: 19.2,
                annual_cost_increase: 30.0,
                price_history: vec![],
            }],
            overlaps: vec![Overlap {
                category: "Streaming".into(),
                count: 2,
                subscriptions: vec![
                    OverlapMember {
                        merchant: "HULU".into(),
                        annual_cost: 95.88,
                    },
                    OverlapMember {
                        merchant: "NETFLIX".into(),
                        annual_cost: 185.88,
                    },
                ],
                combined_annual: 281.76,
                potential_savings: 185.88,
                keep: "HULU".into(),
            }],
        };
        let mut results = ToolResults::default();
        results.insert(ToolResult {
            tool_source: ToolKind::SubscriptionHunter,
            confidence: Confidence::High,
            payload: ToolPayload::Subscriptions(report),
        });
        results
    }

    #[test]
    fn test_price_creep_folds_into_overlap() {
        let synthesis = synthesize(&streaming_results(), &SynthesisConfig::default());

        let overlap = synthesis
            .insights
            .iter()
            .find(|i| i.canonical_key == "overlap:streaming")
            .unwrap();
        assert_eq!(overlap.dollar_impact, 185.88);
        assert_eq!(overlap.related, vec!["price_creep:NETFLIX".to_string()]);
        assert!(synthesis
            .insights
            .iter()
            .all(|i| i.canonical_key != "price_creep:NETFLIX"));

        // only the overlap carries dollars into the plan
        assert_eq!(synthesis.savings_plan.opportunities.len(), 1);
        assert_eq!(synthesis.savings_plan.total_annual_savings, 185.88);
    }

    #[test]
    fn test_spike_dollars_annualized() {
        let mut results = ToolResults::default();
        results.insert(ToolResult {
            tool_source: ToolKind::AnomalyDetection,
            confidence: Confidence::Medium,
            payload: ToolPayload::Anomaly(AnomalyReport {
                spending_spikes: vec![SpendingSpike {
                    category: "Travel".into(),
                    recent_month: YearMonth::new(2024, 12),
                    recent_month_total: 800.0,
                    prior_avg: 200.0,
                    spike_pct: 300.0,
                    months_compared: 3,
                }],
                ..AnomalyReport::default()
            }),
        });
        let synthesis = synthesize(&results, &SynthesisConfig::default());
        let spike = &synthesis.insights[0];
        assert_eq!(spike.canonical_key, "spike:travel");
        assert_eq!(spike.dollar_impact, 7200.0);
        assert_eq!(spike.confidence, Confidence::High);
        assert!(spike.title.contains("December 2024"));
    }

    #[test]
    fn test_no_duplicate_keys() {
        let synthesis = synthesize(&streaming_results(), &SynthesisConfig::default());
        let mut seen = BTreeSet::new();
        for insight in &synthesis.insights {
            assert!(seen.insert((insight.tool_source, insight.canonical_key.clone())));
            assert!(validate_framing(&insight.description).is_ok());
        }
    }

    #[test]
    fn test_framing_validator() {
        assert!(validate_framing("You could free up $120/yr").is_ok());
        assert!(validate_framing("You should stop this").is_err());
        assert!(validate_framing("Your burn rate is high").is_err());
        assert!(validate_framing("Try to cut groceries by 10%").is_err());
        assert!(validate_framing("Consider trimming your rent & housing costs").is_err());
        assert!(validate_framing("Trimming dining by 20% helps").is_ok());
        // whole words only
        assert!(validate_framing("Badminton club dues").is_ok());
    }

    #[test]
    fn test_names_masked_before_framing() {
        let names = ["WASTE MANAGEMENT", "BAD DADDY'S BURGER", "Groceries"];
        assert!(validate_framing_with("WASTE MANAGEMENT went up 40%", &names).is_ok());
        assert!(validate_framing_with("Bad Daddy's Burger is new this month", &names).is_ok());
        // the wording itself is still checked
        assert!(validate_framing_with("WASTE MANAGEMENT is a waste", &names).is_err());
        // essential categories are never masked
        assert!(validate_framing_with("Try to cut Groceries by 10%", &names).is_err());
        assert!(validate_framing("WASTE MANAGEMENT went up 40%").is_err());
    }

    #[test]
    fn test_banned_word_in_merchant_keeps_insight() {
        let report = SubscriptionReport {
            recurring: vec![charge("WASTE MANAGEMENT", 42.0)],
            price_creep: vec![PriceCreep {
                merchant: "WASTE MANAGEMENT".into(),
                price_creep_detected: true,
                original_price: 30.0,
                current_price: 42.0,
                total_increase_pct: 40.0,
                annual_cost_increase: 144.0,
                price_history: vec![],
            }],
            overlaps: vec![],
        };
        let mut results = ToolResults::default();
        results.insert(ToolResult {
            tool_source: ToolKind::SubscriptionHunter,
            confidence: Confidence::High,
            payload: ToolPayload::Subscriptions(report),
        });

        let synthesis = synthesize(&results, &SynthesisConfig::default());

        let creep = synthesis
            .insights
            .iter()
            .find(|i| i.canonical_key == "price_creep:WASTE MANAGEMENT")
            .unwrap();
        assert_eq!(creep.dollar_impact, 144.0);
        assert_eq!(creep.title, "WASTE MANAGEMENT price went up 40%");
    }

    #[test]
    fn test_money_format() {
        assert_eq!(money(7.5), "$7.50");
        assert_eq!(money(1234.4), "$1,234");
        assert_eq!(money(1234567.0), "$1,234,567");
        assert_eq!(money(-250.0), "-$250");
    }
}
