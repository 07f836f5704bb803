//! Follow-up question routing
//!
//! Questions are matched against an existing [`AnalysisRun`] with keyword and
//! entity rules. A few intents trigger a scoped recomputation over the run's
//! ledger (cancellation, period comparison, what-if, projection); nothing
//! here re-runs the pipeline. When no computed result answers a question the
//! response is an explicit fallback rather than a guess.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{AnalysisConfig, ResilienceConfig};
use crate::engine::AnalysisRun;
use crate::models::{is_discretionary, is_essential, normalize_merchant, Confidence, Transaction, YearMonth};
use crate::stats::{self, round_to};
use crate::tools::resilience::{self, Scenario};
use crate::tools::ToolKind;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub tool_used: String,
    pub answer_payload: Value,
    pub confidence: Confidence,
    pub methodology: String,
    pub fallback: bool,
}

impl AskResponse {
    fn answer(
        tool_used: impl Into<String>,
        payload: Value,
        confidence: Confidence,
        methodology: impl Into<String>,
    ) -> Self {
        Self {
            tool_used: tool_used.into(),
            answer_payload: payload,
            confidence,
            methodology: methodology.into(),
            fallback: false,
        }
    }

    fn fallback(reason: Option<String>) -> Self {
        let mut payload = json!({ "message": "no exact computation available" });
        if let Some(reason) = reason {
            payload["reason"] = Value::String(reason);
        }
        Self {
            tool_used: "none".into(),
            answer_payload: payload,
            confidence: Confidence::Low,
            methodology: "No computed result matches this question".into(),
            fallback: true,
        }
    }
}

/// Things named in a question
#[derive(Debug, Default)]
struct Entities {
    merchant: Option<String>,
    category: Option<String>,
    months: Vec<YearMonth>,
    percent: Option<f64>,
    horizon: Option<usize>,
}

static MONTH_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})\b").unwrap());

static MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\b(?:\s+(\d{4}))?")
        .unwrap()
});

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:%|percent\b)").unwrap());

static HORIZON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s+months?\b").unwrap());

/// Lowercased question with word-boundary matching
struct Question {
    padded: String,
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '&')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

impl Question {
    fn new(text: &str) -> Self {
        Self {
            padded: format!(" {} ", words(text).join(" ")),
        }
    }

    /// Any of the words or phrases appears as whole words
    fn mentions(&self, words: &[&str]) -> bool {
        words
            .iter()
            .any(|w| self.padded.contains(&format!(" {} ", w)))
    }

    /// A merchant or category name appears as a whole-word run
    fn contains(&self, name: &str) -> bool {
        let name = words(name);
        !name.is_empty() && self.padded.contains(&format!(" {} ", name.join(" ")))
    }
}

#[derive(Debug, Clone)]
pub struct AskRouter {
    resilience: ResilienceConfig,
    cut_pct: f64,
}

impl AskRouter {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            resilience: config.resilience.clone(),
            cut_pct: config.synthesis.discretionary_cut_pct,
        }
    }

    pub fn route(&self, question: &str, run: &AnalysisRun) -> AskResponse {
        let q = Question::new(question);
        let entities = extract(&q, question, run);
        tracing::debug!(?entities, "Routing question");

        if q.mentions(&["cancel", "cancelling", "canceling", "stop paying", "get rid of"]) {
            if let Some(merchant) = &entities.merchant {
                return simulate_cancellation(merchant, run);
            }
        }

        if q.mentions(&["compare", "vs", "versus"]) && entities.months.len() >= 2 {
            return compare_periods(entities.months[0], entities.months[1], run);
        }

        if q.mentions(&["what if", "cut", "reduce", "reduced", "trim"]) || entities.percent.is_some() {
            if let Some(category) = &entities.category {
                let pct = entities.percent.unwrap_or(self.cut_pct);
                return spending_what_if(category, pct, run);
            }
        }

        if q.mentions(&["future", "projection", "project", "forecast", "next year", "next month"])
            || (q.mentions(&["next"]) && entities.horizon.is_some())
        {
            return self.simulate_future(&q, &entities, run);
        }

        if let Some(merchant) = &entities.merchant {
            return find_merchant_pattern(merchant, run);
        }

        if let Some(category) = &entities.category {
            return breakdown_category(category, entities.months.first().copied(), run);
        }

        if let Some(response) = tool_slice(&q, run) {
            return response;
        }

        if q.mentions(&["save", "saving", "options", "where can i"]) {
            return self.multi_analyze(run);
        }

        if q.mentions(&["insights", "insight", "summary", "overview", "highlights"]) {
            return AskResponse::answer(
                "insights",
                json!({ "insights": run.insights, "total": run.all_insights.len() }),
                run.insights
                    .first()
                    .map(|i| i.confidence)
                    .unwrap_or(Confidence::Low),
                "Ranked insights from the completed analysis",
            );
        }

        AskResponse::fallback(None)
    }

    fn simulate_future(&self, q: &Question, entities: &Entities, run: &AnalysisRun) -> AskResponse {
        let scenario = if q.mentions(&["job", "lose", "lost", "laid off", "unemployed"]) {
            Scenario::JobLoss
        } else if q.mentions(&["subscriptions", "subscription"])
            && q.mentions(&["cancel", "drop", "without", "purge", "all"])
        {
            Scenario::SubscriptionPurge
        } else if let Some(category) = &entities.category {
            Scenario::ExpenseIncrease {
                category: category.clone(),
                multiplier: 1.0 + entities.percent.unwrap_or(self.cut_pct) / 100.0,
            }
        } else {
            Scenario::Baseline
        };
        let months = entities
            .horizon
            .unwrap_or(self.resilience.projection_months)
            .clamp(1, 36);

        match resilience::project(&run.ledger, months, scenario, &self.resilience) {
            Ok(projection) => AskResponse::answer(
                "simulate_future",
                serde_json::to_value(&projection).unwrap_or_default(),
                Confidence::Medium,
                format!(
                    "{} seeded simulations of monthly spend per category over {} months",
                    self.resilience.simulations, months
                ),
            ),
            Err(e) => AskResponse::fallback(Some(e.to_string())),
        }
    }

    fn multi_analyze(&self, run: &AnalysisRun) -> AskResponse {
        let pivot = run.ledger.monthly_pivot();
        let mut discretionary: Vec<(String, f64)> = pivot
            .columns
            .iter()
            .filter(|(c, _)| is_discretionary(c))
            .map(|(c, series)| (c.clone(), stats::mean(series)))
            .filter(|(_, avg)| *avg > 0.0)
            .collect();
        discretionary.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let what_ifs: Vec<Value> = discretionary
            .iter()
            .take(3)
            .map(|(category, avg)| what_if_payload(category, *avg, self.cut_pct))
            .collect();

        let (overlaps, creeping) = match run.results.subscriptions() {
            Some(report) => (
                serde_json::to_value(&report.overlaps).unwrap_or_default(),
                serde_json::to_value(&report.price_creep).unwrap_or_default(),
            ),
            None => (json!([]), json!([])),
        };

        AskResponse::answer(
            "multi_analyze",
            json!({
                "discretionary_what_ifs": what_ifs,
                "subscription_overlaps": overlaps,
                "price_creep": creeping,
                "savings_plan": run.savings_plan,
            }),
            Confidence::Medium,
            format!(
                "Top discretionary categories at a {:.0}% trim, plus subscription overlaps and price increases",
                self.cut_pct
            ),
        )
    }
}

fn extract(q: &Question, original: &str, run: &AnalysisRun) -> Entities {
    let mut entities = Entities::default();

    let mut best: Option<(usize, String)> = None;
    for t in run.ledger.spending() {
        for candidate in [t.merchant.to_lowercase(), normalize_merchant(&t.merchant).to_lowercase()] {
            if candidate.len() >= 3
                && q.contains(&candidate)
                && best.as_ref().map_or(true, |(len, _)| candidate.len() > *len)
            {
                best = Some((candidate.len(), normalize_merchant(&t.merchant)));
            }
        }
    }
    entities.merchant = best.map(|(_, m)| m);

    entities.category = run
        .profile
        .categories()
        .filter(|c| q.contains(&c.to_lowercase()))
        .max_by_key(|c| c.len())
        .map(str::to_string);

    let known: Vec<YearMonth> = run.profile.monthly_totals.iter().map(|m| m.month).collect();
    let mut found: Vec<(usize, YearMonth)> = vec![];
    for caps in MONTH_TOKEN.captures_iter(original) {
        if let (Some(whole), Ok(year), Ok(month)) = (caps.get(0), caps[1].parse::<i32>(), caps[2].parse::<u32>()) {
            if (1..=12).contains(&month) {
                found.push((whole.start(), YearMonth::new(year, month)));
            }
        }
    }
    for caps in MONTH_NAME.captures_iter(original) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps[1].to_lowercase();
        let Some(index) = MONTH_NAMES.iter().position(|m| *m == name) else {
            continue;
        };
        let month = index as u32 + 1;
        let resolved = match caps.get(2).and_then(|y| y.as_str().parse().ok()) {
            Some(year) => Some(YearMonth::new(year, month)),
            // latest matching month in the data
            None => known.iter().rev().find(|ym| ym.month == month).copied(),
        };
        if let Some(ym) = resolved {
            found.push((whole.start(), ym));
        }
    }
    found.sort_by_key(|(at, _)| *at);
    entities.months = found.into_iter().map(|(_, ym)| ym).collect();

    entities.percent = PERCENT
        .captures(original)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|p| *p > 0.0);
    entities.horizon = HORIZON
        .captures(original)
        .and_then(|c| c[1].parse::<usize>().ok())
        .filter(|n| *n > 0);

    entities
}

fn merchant_rows<'a>(merchant: &str, run: &'a AnalysisRun) -> Vec<&'a Transaction> {
    run.ledger
        .spending()
        .filter(|t| normalize_merchant(&t.merchant) == merchant)
        .collect()
}

fn simulate_cancellation(merchant: &str, run: &AnalysisRun) -> AskResponse {
    let report = run.results.subscriptions();
    if let Some(charge) = report.and_then(|r| r.find(merchant)) {
        let overlap = report.and_then(|r| {
            r.overlaps
                .iter()
                .find(|o| o.subscriptions.iter().any(|m| m.merchant == charge.merchant))
        });
        let remaining = report.map(|r| r.total_annual() - charge.annual_cost).unwrap_or(0.0);
        return AskResponse::answer(
            "simulate_cancellation",
            json!({
                "merchant": charge.merchant,
                "frequency": charge.frequency,
                "amount": charge.amount,
                "annual_savings": charge.annual_cost,
                "monthly_savings": round_to(charge.annual_cost / 12.0, 2),
                "overlap_category": overlap.map(|o| o.category.clone()),
                "alternative_kept": overlap.map(|o| o.keep.clone()).filter(|k| k != &charge.merchant),
                "remaining_recurring_annual": round_to(remaining.max(0.0), 2),
            }),
            charge.confidence,
            "Annual cost of the recurring charge, removed from the subscription total",
        );
    }

    let rows = merchant_rows(merchant, run);
    if rows.is_empty() {
        return AskResponse::fallback(Some(format!("No spending found for {}", merchant)));
    }
    let total: f64 = rows.iter().map(|t| t.amount).sum();
    let months = run.profile.months_count.max(1) as f64;
    let monthly = total / months;
    AskResponse::answer(
        "simulate_cancellation",
        json!({
            "merchant": merchant,
            "recurring": false,
            "monthly_savings": round_to(monthly, 2),
            "annual_savings": round_to(monthly * 12.0, 2),
            "transactions": rows.len(),
        }),
        Confidence::Medium,
        "Average monthly spend at this merchant over the ledger, annualized",
    )
}

fn month_totals(month: YearMonth, run: &AnalysisRun) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for t in run.ledger.spending().filter(|t| t.month() == month) {
        *totals.entry(t.category.clone()).or_insert(0.0) += t.amount;
    }
    totals
}

fn compare_periods(a: YearMonth, b: YearMonth, run: &AnalysisRun) -> AskResponse {
    let first = month_totals(a, run);
    let second = month_totals(b, run);
    if first.is_empty() && second.is_empty() {
        return AskResponse::fallback(Some(format!("No spending recorded in {} or {}", a, b)));
    }
    let total_a: f64 = first.values().sum();
    let total_b: f64 = second.values().sum();

    let mut categories: Vec<String> = first.keys().chain(second.keys()).cloned().collect();
    categories.sort();
    categories.dedup();
    let mut rows: Vec<(String, f64, f64)> = categories
        .into_iter()
        .map(|c| {
            let x = first.get(&c).copied().unwrap_or(0.0);
            let y = second.get(&c).copied().unwrap_or(0.0);
            (c, x, y)
        })
        .collect();
    rows.sort_by(|l, r| {
        (r.2 - r.1)
            .abs()
            .total_cmp(&(l.2 - l.1).abs())
            .then_with(|| l.0.cmp(&r.0))
    });

    let change_pct = if total_a > 0.0 {
        Some(round_to((total_b - total_a) / total_a * 100.0, 1))
    } else {
        None
    };
    AskResponse::answer(
        "compare_periods",
        json!({
            "period_a": { "month": a, "total": round_to(total_a, 2) },
            "period_b": { "month": b, "total": round_to(total_b, 2) },
            "difference": round_to(total_b - total_a, 2),
            "change_pct": change_pct,
            "categories": rows.iter().map(|(c, x, y)| json!({
                "category": c,
                "period_a": round_to(*x, 2),
                "period_b": round_to(*y, 2),
                "difference": round_to(y - x, 2),
            })).collect::<Vec<_>>(),
        }),
        Confidence::High,
        "Direct sums of spending per category for each month",
    )
}

fn what_if_payload(category: &str, monthly_avg: f64, pct: f64) -> Value {
    let monthly = monthly_avg * pct / 100.0;
    json!({
        "category": category,
        "monthly_avg": round_to(monthly_avg, 2),
        "reduction_pct": pct,
        "monthly_savings": round_to(monthly, 2),
        "annual_savings": round_to(monthly * 12.0, 2),
        "essential": is_essential(category),
    })
}

fn spending_what_if(category: &str, pct: f64, run: &AnalysisRun) -> AskResponse {
    let pivot = run.ledger.monthly_pivot();
    let Some(series) = pivot.series(category) else {
        return AskResponse::fallback(Some(format!("No monthly spending for {}", category)));
    };
    AskResponse::answer(
        "spending_what_if",
        what_if_payload(category, stats::mean(series), pct.min(100.0)),
        Confidence::High,
        format!("Average monthly {} spend scaled by {:.0}%", category, pct.min(100.0)),
    )
}

fn find_merchant_pattern(merchant: &str, run: &AnalysisRun) -> AskResponse {
    let rows = merchant_rows(merchant, run);
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return AskResponse::fallback(Some(format!("No spending found for {}", merchant)));
    };
    let amounts: Vec<f64> = rows.iter().map(|t| t.amount).collect();
    let mut months: Vec<YearMonth> = rows.iter().map(|t| t.month()).collect();
    months.dedup();
    let days: Vec<f64> = rows.iter().map(|t| t.date.day() as f64).collect();

    let recurring = run.results.subscriptions().and_then(|r| r.find(merchant));
    AskResponse::answer(
        "find_merchant_pattern",
        json!({
            "merchant": merchant,
            "category": first.category,
            "transactions": rows.len(),
            "total": round_to(amounts.iter().sum(), 2),
            "avg_amount": round_to(stats::mean(&amounts), 2),
            "first_seen": first.date,
            "last_seen": last.date,
            "months_active": months.len(),
            "typical_day_of_month": stats::median(&days).round() as u32,
            "recurring": recurring,
        }),
        recurring.map(|r| r.confidence).unwrap_or(Confidence::Medium),
        "Every spending transaction at this merchant",
    )
}

fn breakdown_category(category: &str, month: Option<YearMonth>, run: &AnalysisRun) -> AskResponse {
    let rows: Vec<&Transaction> = run
        .ledger
        .spending()
        .filter(|t| t.category.eq_ignore_ascii_case(category))
        .filter(|t| month.map_or(true, |m| t.month() == m))
        .collect();
    if rows.is_empty() {
        return AskResponse::fallback(Some(match month {
            Some(m) => format!("No {} spending in {}", category, m),
            None => format!("No {} spending", category),
        }));
    }

    let total: f64 = rows.iter().map(|t| t.amount).sum();
    let mut by_merchant: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for t in &rows {
        let entry = by_merchant.entry(normalize_merchant(&t.merchant)).or_insert((0.0, 0));
        entry.0 += t.amount;
        entry.1 += 1;
    }
    let mut merchants: Vec<(String, f64, usize)> =
        by_merchant.into_iter().map(|(m, (sum, n))| (m, sum, n)).collect();
    merchants.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let pivot = run.ledger.monthly_pivot();
    let monthly_avg = pivot.series(category).map(stats::mean).unwrap_or(0.0);
    let share = run
        .profile
        .category_breakdown
        .iter()
        .find(|c| c.category.eq_ignore_ascii_case(category))
        .map(|c| c.share_pct);

    AskResponse::answer(
        "breakdown_category",
        json!({
            "category": category,
            "month": month,
            "total": round_to(total, 2),
            "transactions": rows.len(),
            "monthly_avg": round_to(monthly_avg, 2),
            "share_pct": share,
            "top_merchants": merchants.iter().take(5).map(|(m, sum, n)| json!({
                "merchant": m,
                "total": round_to(*sum, 2),
                "transactions": n,
            })).collect::<Vec<_>>(),
        }),
        Confidence::High,
        "Direct sums over the category's transactions",
    )
}

/// Slice of a completed tool's result, or a fallback when it was skipped
fn tool_slice(q: &Question, run: &AnalysisRun) -> Option<AskResponse> {
    let (tool, name) = if q.mentions(&[
        "subscription",
        "subscriptions",
        "price",
        "prices",
        "overlap",
        "overlaps",
        "overlapping",
        "recurring",
    ]) {
        (ToolKind::SubscriptionHunter, "subscription_hunter")
    } else if q.mentions(&[
        "unusual",
        "spike",
        "spikes",
        "new merchant",
        "new merchants",
        "outlier",
        "outliers",
        "anomaly",
        "anomalies",
    ]) {
        (ToolKind::AnomalyDetection, "anomaly_detection")
    } else if q.mentions(&["payday", "weekend", "weekends", "weekday", "seasonal", "season"]) {
        (ToolKind::TemporalPatterns, "temporal_patterns")
    } else if q.mentions(&["correlation", "correlated", "together", "related", "linked"]) {
        (ToolKind::CorrelationEngine, "correlation_engine")
    } else if q.mentions(&["runway", "job", "emergency", "last"]) {
        (ToolKind::SpendingImpact, "financial_resilience")
    } else if q.mentions(&["driver", "drivers", "drives", "variation", "swings", "impact"]) {
        (ToolKind::SpendingImpact, "spending_impact")
    } else {
        return None;
    };

    let Some(result) = run.results.get(tool) else {
        let reason = run
            .skip_reason(tool.name())
            .map(|r| format!("{} was skipped: {}", tool, r))
            .unwrap_or_else(|| format!("{} did not run", tool));
        return Some(AskResponse::fallback(Some(reason)));
    };

    let payload = match name {
        "financial_resilience" => run
            .results
            .impact()
            .and_then(|i| serde_json::to_value(&i.financial_resilience).ok()),
        "spending_impact" => run.results.impact().and_then(|i| {
            if i.spending_impact.model_valid {
                serde_json::to_value(&i.spending_impact).ok()
            } else {
                None
            }
        }),
        _ => serde_json::to_value(&result.payload).ok(),
    };

    Some(match payload {
        Some(payload) => AskResponse::answer(
            name,
            payload,
            result.confidence,
            format!("Result of {} from the completed analysis", name),
        ),
        None => AskResponse::fallback(Some(format!("{} has no usable result", name))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AnalysisEngine;
    use crate::models::Ledger;
    use chrono::NaiveDate;
    use std::sync::Arc;

    async fn analyzed() -> AnalysisRun {
        let mut txs = vec![];
        for m in 1..=8u32 {
            let d = |day: u32| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
            txs.push(Transaction::new(d(1), "ACME PAYROLL", 4000.0, "Income"));
            txs.push(Transaction::new(d(2), "LANDLORD", 1400.0, "Rent & Housing"));
            txs.push(Transaction::new(d(5), "NETFLIX", 15.49, "Subscriptions"));
            txs.push(Transaction::new(d(7), "HULU", 7.99, "Subscriptions"));
            txs.push(Transaction::new(d(10), "BISTRO", 80.0 + m as f64 * 10.0, "Dining"));
            txs.push(Transaction::new(d(16), "MARKET", 300.0, "Groceries"));
        }
        AnalysisEngine::default()
            .analyze(Arc::new(Ledger::new(txs)))
            .await
            .unwrap()
    }

    fn router() -> AskRouter {
        AskRouter::new(&AnalysisConfig::default())
    }

    #[tokio::test]
    async fn test_cancellation_uses_recurring_charge() {
        let run = analyzed().await;
        let response = router().route("What if I cancel Netflix?", &run);
        assert_eq!(response.tool_used, "simulate_cancellation");
        assert!(!response.fallback);
        assert_eq!(response.answer_payload["merchant"], "NETFLIX");
        let annual = response.answer_payload["annual_savings"].as_f64().unwrap();
        assert!((annual - 185.88).abs() < 0.01);
    }

    #[test]
    fn test_names_match_whole_words() {
        let q = Question::new("I barely went out; were the bistros pricey?");
        assert!(!q.contains("Bars"));
        assert!(!q.contains("BISTRO"));
        assert!(q.contains("went out"));
        assert!(!q.contains(""));

        let q = Question::new("How much went to Rent & Housing at the bars?");
        assert!(q.contains("Rent & Housing"));
        assert!(q.contains("Bars"));
    }

    #[tokio::test]
    async fn test_extract_ignores_partial_words() {
        let run = analyzed().await;

        let question = "were the bistros busy";
        let entities = extract(&Question::new(question), question, &run);
        assert_eq!(entities.merchant, None);

        let question = "Did dining at BISTRO go up 10% over 3 months?";
        let entities = extract(&Question::new(question), question, &run);
        assert_eq!(entities.merchant.as_deref(), Some("BISTRO"));
        assert_eq!(entities.category.as_deref(), Some("Dining"));
        assert_eq!(entities.percent, Some(10.0));
        assert_eq!(entities.horizon, Some(3));
    }

    #[test]
    fn test_question_patterns() {
        let caps = MONTH_TOKEN.captures("compare 2024-02 vs 2024-05").unwrap();
        assert_eq!(&caps[2], "02");
        let caps = MONTH_NAME.captures("groceries in March 2024").unwrap();
        assert_eq!(&caps[1], "March");
        assert_eq!(&caps[2], "2024");
        assert!(PERCENT.captures("a 12.5 percent trim").is_some());
        assert!(HORIZON.captures("the next 12 months").is_some());
    }

    #[tokio::test]
    async fn test_compare_months() {
        let run = analyzed().await;
        let response = router().route("compare 2024-02 vs 2024-05", &run);
        assert_eq!(response.tool_used, "compare_periods");
        assert_eq!(response.answer_payload["period_a"]["month"], "2024-02");
        // dining is the only category that changes: 100 -> 130
        assert_eq!(response.answer_payload["difference"].as_f64().unwrap(), 30.0);
        assert_eq!(response.answer_payload["categories"][0]["category"], "Dining");
    }

    #[tokio::test]
    async fn test_what_if_percentage() {
        let run = analyzed().await;
        let response = router().route("What if I trim dining by 50%?", &run);
        assert_eq!(response.tool_used, "spending_what_if");
        assert_eq!(response.answer_payload["reduction_pct"].as_f64().unwrap(), 50.0);
        // average dining 125/month
        assert_eq!(response.answer_payload["monthly_savings"].as_f64().unwrap(), 62.5);
        assert_eq!(response.answer_payload["annual_savings"].as_f64().unwrap(), 750.0);
    }

    #[tokio::test]
    async fn test_category_and_month_breakdown() {
        let run = analyzed().await;
        let response = router().route("How much did groceries cost in March 2024?", &run);
        assert_eq!(response.tool_used, "breakdown_category");
        assert_eq!(response.answer_payload["total"].as_f64().unwrap(), 300.0);
        assert_eq!(response.answer_payload["month"], "2024-03");
    }

    #[tokio::test]
    async fn test_tool_slices_and_fallback() {
        let run = analyzed().await;
        let r = router();

        let subs = r.route("Are any of my services overlapping?", &run);
        assert_eq!(subs.tool_used, "subscription_hunter");
        assert!(subs.answer_payload["recurring"].is_array());

        let runway = r.route("How long is my runway?", &run);
        assert_eq!(runway.tool_used, "financial_resilience");

        let unknown = r.route("What is the meaning of life?", &run);
        assert!(unknown.fallback);
        assert_eq!(unknown.tool_used, "none");
        assert_eq!(
            unknown.answer_payload["message"],
            "no exact computation available"
        );
    }

    #[tokio::test]
    async fn test_projection_scenario() {
        let run = analyzed().await;
        let response = router().route("Forecast the next 6 months if I lose my job", &run);
        assert_eq!(response.tool_used, "simulate_future");
        assert_eq!(response.answer_payload["scenario"]["type"], "job_loss");
        assert!(response.answer_payload["monthly"][0]["net_p50"].as_f64().unwrap() < 0.0);

        let response = router().route("How long would my savings last if I lose my job?", &run);
        assert_eq!(response.tool_used, "financial_resilience");

        let response = router().route("Forecast my spending for the next 6 months", &run);
        assert_eq!(response.tool_used, "simulate_future");
        assert_eq!(response.answer_payload["months"], 6);
        assert_eq!(response.answer_payload["scenario"]["type"], "baseline");
    }
}
