//! Ledger profiling
//!
//! The profile is the only input the gate table sees, so everything a gate
//! needs to know about data sufficiency is computed here once.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::config::GateConfig;
use crate::error::{Error, Result};
use crate::models::{normalize_merchant, Ledger, YearMonth};
use crate::stats;

/// One month of spending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub month: YearMonth,
    pub total: f64,
}

/// Spend attributed to one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpend {
    pub category: String,
    pub total: f64,
    pub transaction_count: usize,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendingTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Read-only summary of a ledger
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub transaction_count: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub date_range_days: i64,
    pub months_count: usize,
    pub monthly_totals: Vec<MonthlyTotal>,
    pub category_breakdown: Vec<CategorySpend>,
    /// Spend categories whose total clears the non-trivial threshold
    pub category_count: usize,
    pub total_spent: f64,
    pub monthly_average: f64,
    pub has_income: bool,
    pub income_deposit_count: usize,
    pub monthly_income: f64,
    pub highest_month: Option<MonthlyTotal>,
    pub lowest_month: Option<MonthlyTotal>,
    pub recent_3mo_avg: f64,
    pub spending_trend: SpendingTrend,
    pub biggest_swing_category: Option<String>,
    /// Merchants with at least two charges of near-identical amount
    pub repeated_charge_pairs: usize,
}

impl Profile {
    /// Categories with non-trivial spend, largest first
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.category_breakdown.iter().map(|c| c.category.as_str())
    }
}

/// Computes a [`Profile`] from a ledger
pub struct Profiler {
    config: GateConfig,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            config: GateConfig::default(),
        }
    }

    pub fn with_config(config: GateConfig) -> Self {
        Self { config }
    }

    /// Profile a ledger. Fails on an empty ledger or non-finite amounts.
    pub fn profile(&self, ledger: &Ledger) -> Result<Profile> {
        let (start_date, end_date) = ledger
            .date_bounds()
            .ok_or_else(|| Error::Profiler("ledger contains no transactions".into()))?;

        if let Some(bad) = ledger.transactions().iter().find(|t| !t.amount.is_finite()) {
            return Err(Error::Profiler(format!(
                "non-finite amount for {} on {}",
                bad.merchant, bad.date
            )));
        }

        let pivot = ledger.monthly_pivot();
        let monthly_totals: Vec<MonthlyTotal> = pivot
            .months
            .iter()
            .zip(pivot.totals())
            .map(|(month, total)| MonthlyTotal {
                month: *month,
                total: stats::round_to(total, 2),
            })
            .collect();
        let totals: Vec<f64> = monthly_totals.iter().map(|m| m.total).collect();

        let total_spent: f64 = ledger.spending().map(|t| t.amount).sum();
        let months_count = monthly_totals.len();

        let category_breakdown = self.category_breakdown(ledger, total_spent);
        let category_count = category_breakdown.len();

        let income: Vec<f64> = ledger.income().map(|t| t.amount.abs()).collect();
        let income_months = ledger
            .income()
            .map(|t| t.month())
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        let monthly_income = if income_months > 0 {
            income.iter().sum::<f64>() / months_count.max(income_months) as f64
        } else {
            0.0
        };

        let highest_month = monthly_totals
            .iter()
            .max_by(|a, b| a.total.total_cmp(&b.total))
            .cloned();
        let lowest_month = monthly_totals
            .iter()
            .min_by(|a, b| a.total.total_cmp(&b.total))
            .cloned();

        let recent = &totals[totals.len().saturating_sub(3)..];

        let biggest_swing_category = pivot
            .columns
            .iter()
            .map(|(cat, series)| {
                let max = series.iter().copied().fold(f64::MIN, f64::max);
                let min = series.iter().copied().fold(f64::MAX, f64::min);
                (cat, max - min)
            })
            .filter(|(_, swing)| *swing > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(cat, _)| cat.clone());

        let profile = Profile {
            transaction_count: ledger.len(),
            start_date,
            end_date,
            date_range_days: (end_date - start_date).num_days(),
            months_count,
            monthly_totals,
            category_breakdown,
            category_count,
            total_spent: stats::round_to(total_spent, 2),
            monthly_average: stats::round_to(stats::mean(&totals), 2),
            has_income: !income.is_empty(),
            income_deposit_count: income.len(),
            monthly_income: stats::round_to(monthly_income, 2),
            highest_month,
            lowest_month,
            recent_3mo_avg: stats::round_to(stats::mean(recent), 2),
            spending_trend: spending_trend(&totals),
            biggest_swing_category,
            repeated_charge_pairs: self.repeated_charge_pairs(ledger),
        };

        debug!(
            transactions = profile.transaction_count,
            months = profile.months_count,
            categories = profile.category_count,
            has_income = profile.has_income,
            "Profiled ledger"
        );

        Ok(profile)
    }

    fn category_breakdown(&self, ledger: &Ledger, total_spent: f64) -> Vec<CategorySpend> {
        let mut by_category: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for t in ledger.spending() {
            let entry = by_category.entry(t.category.as_str()).or_insert((0.0, 0));
            entry.0 += t.amount;
            entry.1 += 1;
        }

        let mut breakdown: Vec<CategorySpend> = by_category
            .into_iter()
            .filter(|(_, (total, _))| *total >= self.config.min_category_spend)
            .map(|(category, (total, count))| CategorySpend {
                category: category.to_string(),
                total: stats::round_to(total, 2),
                transaction_count: count,
                share_pct: if total_spent > 0.0 {
                    stats::round_to(total / total_spent * 100.0, 1)
                } else {
                    0.0
                },
            })
            .collect();

        breakdown.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.category.cmp(&b.category))
        });
        breakdown
    }

    /// Count merchants that charged a near-identical amount at least twice
    fn repeated_charge_pairs(&self, ledger: &Ledger) -> usize {
        let mut by_merchant: HashMap<String, Vec<f64>> = HashMap::new();
        for t in ledger.spending().filter(|t| t.amount > 0.0) {
            by_merchant
                .entry(normalize_merchant(&t.merchant))
                .or_default()
                .push(t.amount);
        }

        let needed = self.config.subscription_min_pair_occurrences.max(2);
        let tolerance = self.config.subscription_amount_tolerance;

        by_merchant
            .values_mut()
            .map(|amounts| {
                amounts.sort_by(|a, b| a.total_cmp(b));
                // longest run of amounts within tolerance of the run's first amount
                let mut best = 0;
                let mut start = 0;
                for end in 0..amounts.len() {
                    while amounts[end] > amounts[start] * (1.0 + tolerance) {
                        start += 1;
                    }
                    best = best.max(end - start + 1);
                }
                best >= needed
            })
            .filter(|repeated| *repeated)
            .count()
    }
}

/// Compare the mean of the first three months to the last three (±10%)
fn spending_trend(totals: &[f64]) -> SpendingTrend {
    if totals.len() < 4 {
        return SpendingTrend::Stable;
    }
    let n = totals.len().min(6) / 2;
    let first = stats::mean(&totals[..n]);
    let last = stats::mean(&totals[totals.len() - n..]);

    if first <= 0.0 {
        return SpendingTrend::Stable;
    }
    match (last - first) / first {
        r if r > 0.10 => SpendingTrend::Increasing,
        r if r < -0.10 => SpendingTrend::Decreasing,
        _ => SpendingTrend::Stable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transaction;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ledger() -> Ledger {
        Ledger::new(vec![
            Transaction::new(d(2024, 1, 3), "CAFE", 40.0, "Dining"),
            Transaction::new(d(2024, 1, 9), "MARKET", 120.0, "Groceries"),
            Transaction::new(d(2024, 1, 15), "NETFLIX.COM", 15.49, "Subscriptions"),
            Transaction::new(d(2024, 2, 15), "NETFLIX.COM", 15.49, "Subscriptions"),
            Transaction::new(d(2024, 2, 1), "ACME PAYROLL", 2500.0, "Income"),
            Transaction::new(d(2024, 2, 2), "SAVINGS", 400.0, "Transfer"),
            Transaction::new(d(2024, 2, 20), "CAFE", 80.0, "Dining"),
            Transaction::new(d(2024, 3, 1), "ACME PAYROLL", 2500.0, "Income"),
            Transaction::new(d(2024, 3, 12), "MARKET", 100.0, "Groceries"),
        ])
    }

    #[test]
    fn test_profile_basic_fields() {
        let profile = Profiler::new().profile(&ledger()).unwrap();

        assert_eq!(profile.transaction_count, 9);
        assert_eq!(profile.start_date, d(2024, 1, 3));
        assert_eq!(profile.end_date, d(2024, 3, 12));
        assert_eq!(profile.date_range_days, 69);
        assert_eq!(profile.months_count, 3);
        assert_eq!(profile.category_count, 3);
        assert!((profile.total_spent - 370.98).abs() < 1e-9);
        assert!(profile.has_income);
        assert_eq!(profile.income_deposit_count, 2);
        assert!((profile.monthly_income - 5000.0 / 3.0).abs() < 0.01);
        assert_eq!(profile.category_breakdown[0].category, "Groceries");
        assert_eq!(profile.repeated_charge_pairs, 1);
    }

    #[test]
    fn test_monthly_totals_ordered() {
        let profile = Profiler::new().profile(&ledger()).unwrap();
        let months: Vec<String> = profile
            .monthly_totals
            .iter()
            .map(|m| m.month.to_string())
            .collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        assert!((profile.monthly_totals[0].total - 175.49).abs() < 1e-9);
        assert_eq!(profile.highest_month.unwrap().month.to_string(), "2024-01");
        assert_eq!(profile.lowest_month.unwrap().month.to_string(), "2024-02");
    }

    #[test]
    fn test_mixed_case_categories_count_once() {
        let mut txs = vec![];
        for m in 1..=4 {
            txs.push(Transaction::new(d(2024, m, 3), "CAFE", 40.0, "Dining"));
            txs.push(Transaction::new(d(2024, m, 4), "BISTRO", 30.0, "dining"));
            txs.push(Transaction::new(d(2024, m, 5), "DINER", 20.0, "DINING"));
        }
        let profile = Profiler::new().profile(&Ledger::new(txs)).unwrap();

        assert_eq!(profile.category_count, 1);
        assert_eq!(profile.category_breakdown[0].category, "Dining");
        assert_eq!(profile.category_breakdown[0].transaction_count, 12);

        let decisions = crate::gate::evaluate(&profile, &GateConfig::default());
        let correlation = decisions
            .iter()
            .find(|d| d.tool_name == crate::tools::ToolKind::CorrelationEngine)
            .unwrap();
        assert!(!correlation.eligible);
        assert_eq!(
            correlation.reason_if_skipped.as_deref(),
            Some("Need 3+ categories, have 1")
        );
    }

    #[test]
    fn test_repeated_charge_pairs_within_tolerance() {
        let ledger = Ledger::new(vec![
            Transaction::new(d(2024, 1, 5), "GYM", 30.0, "Fitness"),
            Transaction::new(d(2024, 2, 5), "GYM", 32.0, "Fitness"),
            Transaction::new(d(2024, 1, 9), "HARDWARE", 20.0, "Shopping"),
            Transaction::new(d(2024, 2, 9), "HARDWARE", 90.0, "Shopping"),
            Transaction::new(d(2024, 1, 12), "STREAMCO", 9.99, "Subscriptions"),
            Transaction::new(d(2024, 2, 12), "STREAMCO", 9.99, "Subscriptions"),
            Transaction::new(d(2024, 3, 12), "STREAMCO", 9.99, "Subscriptions"),
        ]);
        let profile = Profiler::new().profile(&ledger).unwrap();
        assert_eq!(profile.repeated_charge_pairs, 2);
    }

    #[test]
    fn test_empty_ledger_fails() {
        let err = Profiler::new().profile(&Ledger::default()).unwrap_err();
        assert!(matches!(err, Error::Profiler(_)));
    }

    #[test]
    fn test_non_finite_amount_fails() {
        let ledger = Ledger::new(vec![Transaction::new(d(2024, 1, 1), "X", f64::INFINITY, "Dining")]);
        assert!(matches!(
            Profiler::new().profile(&ledger),
            Err(Error::Profiler(_))
        ));
    }

    #[test]
    fn test_spending_trend() {
        assert_eq!(
            spending_trend(&[100.0, 100.0, 100.0, 150.0, 150.0, 150.0]),
            SpendingTrend::Increasing
        );
        assert_eq!(
            spending_trend(&[200.0, 200.0, 200.0, 100.0, 100.0, 100.0]),
            SpendingTrend::Decreasing
        );
        assert_eq!(spending_trend(&[100.0, 105.0, 98.0, 102.0]), SpendingTrend::Stable);
        assert_eq!(spending_trend(&[100.0]), SpendingTrend::Stable);
    }

    #[test]
    fn test_repeated_pairs_respect_tolerance() {
        let far_apart = Ledger::new(vec![
            Transaction::new(d(2024, 1, 1), "GYM", 10.0, "Fitness"),
            Transaction::new(d(2024, 2, 1), "GYM", 40.0, "Fitness"),
        ]);
        let profile = Profiler::new().profile(&far_apart).unwrap();
        assert_eq!(profile.repeated_charge_pairs, 0);
    }
}
