//! Anomaly detection: unusual transactions, category spikes, new merchants

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::config::AnomalyConfig;
use crate::error::Result;
use crate::models::{Confidence, Ledger, Transaction, YearMonth};
use crate::stats::{self, round_to};

/// A transaction far above its category's usual range
#[derive(Debug, Clone, Serialize)]
pub struct Outlier {
    pub merchant: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub category: String,
    pub category_median: f64,
    pub category_avg: f64,
    pub upper_fence: f64,
    pub iqr_score: f64,
    pub confidence: Confidence,
}

/// Latest month of a category well above its recent average
#[derive(Debug, Clone, Serialize)]
pub struct SpendingSpike {
    pub category: String,
    pub recent_month: YearMonth,
    pub recent_month_total: f64,
    pub prior_avg: f64,
    pub spike_pct: f64,
    pub months_compared: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    OneOff,
    Repeating,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMerchant {
    pub merchant: String,
    pub category: String,
    pub first_seen: NaiveDate,
    pub occurrences: usize,
    pub total: f64,
    pub avg_amount: f64,
    pub recurrence: Recurrence,
    pub high_value: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnomalyReport {
    pub outliers: Vec<Outlier>,
    pub spending_spikes: Vec<SpendingSpike>,
    pub new_merchants: Vec<NewMerchant>,
}

impl AnomalyReport {
    /// HIGH when a strong outlier was found, MEDIUM for any finding, else LOW
    pub fn confidence(&self) -> Confidence {
        if self.outliers.iter().any(|o| o.confidence == Confidence::High) {
            Confidence::High
        } else if !self.outliers.is_empty()
            || !self.spending_spikes.is_empty()
            || !self.new_merchants.is_empty()
        {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

pub fn analyze(ledger: &Ledger, config: &AnomalyConfig) -> Result<AnomalyReport> {
    Ok(AnomalyReport {
        outliers: detect_outliers(ledger, config),
        spending_spikes: detect_spikes(ledger, config),
        new_merchants: detect_new_merchants(ledger, config),
    })
}

fn by_category(ledger: &Ledger) -> BTreeMap<&str, Vec<&Transaction>> {
    let mut groups: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for t in ledger.spending() {
        groups.entry(t.category.as_str()).or_default().push(t);
    }
    groups
}

/// Per-category IQR fence: amount > Q3 + k * IQR
///
/// Amounts are right-skewed, so a quartile fence flags real outliers where a
/// z-score on raw amounts would not.
pub fn detect_outliers(ledger: &Ledger, config: &AnomalyConfig) -> Vec<Outlier> {
    let mut outliers = vec![];

    for (category, rows) in by_category(ledger) {
        if rows.len() < config.outlier_min_transactions {
            continue;
        }
        let amounts: Vec<f64> = rows.iter().map(|t| t.amount).collect();
        let q1 = stats::quantile(&amounts, 0.25);
        let q3 = stats::quantile(&amounts, 0.75);
        let iqr = q3 - q1;
        if iqr <= 0.0 {
            continue;
        }
        let fence = q3 + config.outlier_iqr_multiplier * iqr;
        let median = stats::median(&amounts);
        let avg = stats::mean(&amounts);

        for t in rows.iter().filter(|t| t.amount > fence) {
            let score = round_to((t.amount - q3) / iqr, 1);
            outliers.push(Outlier {
                merchant: t.merchant.clone(),
                amount: round_to(t.amount, 2),
                date: t.date,
                category: category.to_string(),
                category_median: round_to(median, 2),
                category_avg: round_to(avg, 2),
                upper_fence: round_to(fence, 2),
                iqr_score: score,
                confidence: if score >= config.outlier_high_score {
                    Confidence::High
                } else {
                    Confidence::Medium
                },
            });
        }
    }

    outliers.sort_by(|a, b| {
        b.iqr_score
            .total_cmp(&a.iqr_score)
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.merchant.cmp(&b.merchant))
    });
    outliers
}

/// Latest month per category against the trailing average of prior months
pub fn detect_spikes(ledger: &Ledger, config: &AnomalyConfig) -> Vec<SpendingSpike> {
    let Some((start, end)) = ledger.date_bounds() else {
        return vec![];
    };
    if (end - start).num_days() < config.spike_min_span_days {
        return vec![];
    }

    let pivot = ledger.monthly_pivot();
    let Some(&latest) = pivot.months.last() else {
        return vec![];
    };
    let mut spikes = vec![];

    for (category, series) in &pivot.columns {
        // months in which this category actually had spend
        let active: Vec<(YearMonth, f64)> = pivot
            .months
            .iter()
            .zip(series)
            .filter(|(_, v)| **v > 0.0)
            .map(|(m, v)| (*m, *v))
            .collect();
        let Some(((recent_month, recent), prior)) = active.split_last() else {
            continue;
        };
        if prior.is_empty() || *recent_month != latest {
            continue;
        }
        let trailing = match config.spike_trailing_months {
            0 => prior,
            n => &prior[prior.len().saturating_sub(n)..],
        };
        let values: Vec<f64> = trailing.iter().map(|(_, v)| *v).collect();
        let prior_avg = stats::mean(&values);
        if prior_avg <= 0.0 {
            continue;
        }

        let spike_pct = (recent - prior_avg) / prior_avg * 100.0;
        if spike_pct > config.spike_threshold_pct {
            spikes.push(SpendingSpike {
                category: category.clone(),
                recent_month: *recent_month,
                recent_month_total: round_to(*recent, 2),
                prior_avg: round_to(prior_avg, 2),
                spike_pct: round_to(spike_pct, 1),
                months_compared: values.len(),
            });
        }
    }

    spikes.sort_by(|a, b| {
        b.spike_pct
            .total_cmp(&a.spike_pct)
            .then_with(|| a.category.cmp(&b.category))
    });
    spikes
}

/// Merchants first seen inside the recency window
///
/// Repeating merchants are reported when their average clears a floor; a
/// single charge is reported only when it is high-value.
pub fn detect_new_merchants(ledger: &Ledger, config: &AnomalyConfig) -> Vec<NewMerchant> {
    let Some((_, last)) = ledger.date_bounds() else {
        return vec![];
    };
    let cutoff = last - Duration::days(config.new_merchant_window_days);

    let spend: Vec<&Transaction> = ledger.spending().collect();
    let amounts: Vec<f64> = spend.iter().map(|t| t.amount).collect();
    let high_value_at = (stats::median(&amounts) * config.high_value_median_multiple)
        .max(config.high_value_floor);

    let mut by_merchant: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for t in &spend {
        by_merchant.entry(t.merchant.as_str()).or_default().push(*t);
    }

    let mut found = vec![];
    for (merchant, rows) in by_merchant {
        let first_seen = rows[0].date;
        if first_seen < cutoff {
            continue;
        }
        let amounts: Vec<f64> = rows.iter().map(|t| t.amount).collect();
        let total: f64 = amounts.iter().sum();
        let avg = stats::mean(&amounts);

        let (recurrence, high_value) = if rows.len() >= 2 {
            if avg < config.new_merchant_min_avg {
                continue;
            }
            (recurrence_of(&rows), false)
        } else if rows[0].amount >= high_value_at {
            (Recurrence::OneOff, true)
        } else {
            continue;
        };

        found.push(NewMerchant {
            merchant: merchant.to_string(),
            category: rows[0].category.clone(),
            first_seen,
            occurrences: rows.len(),
            total: round_to(total, 2),
            avg_amount: round_to(avg, 2),
            recurrence,
            high_value,
        });
    }

    found.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.merchant.cmp(&b.merchant))
    });
    found
}

fn recurrence_of(rows: &[&Transaction]) -> Recurrence {
    let gaps: Vec<f64> = rows
        .windows(2)
        .map(|w| (w[1].date - w[0].date).num_days() as f64)
        .collect();
    match stats::mean(&gaps) {
        g if (25.0..=35.0).contains(&g) => Recurrence::Monthly,
        g if (6.0..=8.0).contains(&g) => Recurrence::Weekly,
        _ => Recurrence::Repeating,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_outlier_flagged_with_score() {
        let mut txs: Vec<Transaction> = [20.0, 22.0, 25.0, 24.0, 21.0, 23.0]
            .iter()
            .enumerate()
            .map(|(i, a)| Transaction::new(d(2024, 1, 1 + i as u32), "STORE", *a, "Shopping"))
            .collect();
        txs.push(Transaction::new(d(2024, 1, 20), "ELECTRONICS", 900.0, "Shopping"));
        let ledger = Ledger::new(txs);

        let outliers = detect_outliers(&ledger, &AnomalyConfig::default());
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].merchant, "ELECTRONICS");
        assert_eq!(outliers[0].confidence, Confidence::High);
        assert_eq!(outliers[0].category_median, 23.0);
    }

    #[test]
    fn test_outliers_need_enough_rows() {
        let ledger = Ledger::new(vec![
            Transaction::new(d(2024, 1, 1), "A", 10.0, "Dining"),
            Transaction::new(d(2024, 1, 2), "B", 12.0, "Dining"),
            Transaction::new(d(2024, 1, 3), "C", 500.0, "Dining"),
        ]);
        assert!(detect_outliers(&ledger, &AnomalyConfig::default()).is_empty());
    }

    #[test]
    fn test_spike_against_trailing_three_months() {
        let mut txs = vec![];
        for m in 1..=11 {
            txs.push(Transaction::new(d(2024, m, 10), "BISTRO", 100.0, "Dining"));
        }
        txs.push(Transaction::new(d(2024, 12, 10), "BISTRO", 400.0, "Dining"));
        let ledger = Ledger::new(txs);

        let spikes = detect_spikes(&ledger, &AnomalyConfig::default());
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].category, "Dining");
        assert_eq!(spikes[0].recent_month, YearMonth::new(2024, 12));
        assert_eq!(spikes[0].prior_avg, 100.0);
        assert_eq!(spikes[0].spike_pct, 300.0);
        assert_eq!(spikes[0].months_compared, 3);
    }

    #[test]
    fn test_travel_spike_in_final_month() {
        let report = analyze(&crate::test_utils::spike_ledger(), &AnomalyConfig::default()).unwrap();

        let travel = report
            .spending_spikes
            .iter()
            .find(|s| s.category == "Travel")
            .unwrap();
        assert_eq!(travel.prior_avg, 200.0);
        assert_eq!(travel.spike_pct, 300.0);
        assert!(report.spending_spikes.iter().all(|s| s.category != "Groceries"));
    }

    #[test]
    fn test_no_spike_on_short_span() {
        let ledger = Ledger::new(vec![
            Transaction::new(d(2024, 1, 25), "BISTRO", 10.0, "Dining"),
            Transaction::new(d(2024, 2, 5), "BISTRO", 100.0, "Dining"),
        ]);
        assert!(detect_spikes(&ledger, &AnomalyConfig::default()).is_empty());
    }

    #[test]
    fn test_new_merchants() {
        let mut txs = vec![];
        for m in 1..=3 {
            txs.push(Transaction::new(d(2024, m, 1), "OLD MARKET", 40.0, "Groceries"));
        }
        // new monthly service
        txs.push(Transaction::new(d(2024, 3, 10), "NEWSTREAM", 12.0, "Entertainment"));
        txs.push(Transaction::new(d(2024, 4, 8), "NEWSTREAM", 12.0, "Entertainment"));
        // one big purchase
        txs.push(Transaction::new(d(2024, 4, 2), "FURNITURE CO", 800.0, "Shopping"));
        // one small purchase, ignored
        txs.push(Transaction::new(d(2024, 4, 3), "KIOSK", 4.0, "Shopping"));
        let ledger = Ledger::new(txs);

        let found = detect_new_merchants(&ledger, &AnomalyConfig::default());
        let names: Vec<&str> = found.iter().map(|n| n.merchant.as_str()).collect();
        assert_eq!(names, vec!["FURNITURE CO", "NEWSTREAM"]);
        assert!(found[0].high_value);
        assert_eq!(found[0].recurrence, Recurrence::OneOff);
        assert_eq!(found[1].recurrence, Recurrence::Monthly);
        assert_eq!(found[1].occurrences, 2);
    }
}
