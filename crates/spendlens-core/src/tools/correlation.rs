//! Cross-category relationships from monthly totals

use serde::Serialize;

use crate::config::CorrelationConfig;
use crate::error::{Error, Result};
use crate::models::{Confidence, Ledger};
use crate::stats::{self, round_to};

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationPair {
    pub category_a: String,
    pub category_b: String,
    pub correlation: f64,
    pub months: usize,
    pub confidence: Confidence,
    pub interpretation: String,
}

impl CorrelationPair {
    pub fn involves(&self, category: &str) -> bool {
        self.category_a.eq_ignore_ascii_case(category)
            || self.category_b.eq_ignore_ascii_case(category)
    }

    /// The category paired with `category`, if it is part of this pair
    pub fn partner_of(&self, category: &str) -> Option<&str> {
        if self.category_a.eq_ignore_ascii_case(category) {
            Some(&self.category_b)
        } else if self.category_b.eq_ignore_ascii_case(category) {
            Some(&self.category_a)
        } else {
            None
        }
    }
}

/// HIGH if any pair is HIGH, MEDIUM if any pair was retained, else LOW
pub fn overall_confidence(pairs: &[CorrelationPair]) -> Confidence {
    if pairs.iter().any(|p| p.confidence == Confidence::High) {
        Confidence::High
    } else if pairs.is_empty() {
        Confidence::Low
    } else {
        Confidence::Medium
    }
}

/// Pairwise Pearson correlation over the monthly category pivot
///
/// Categories need enough non-zero months to enter. Pairs are emitted once,
/// with `category_a < category_b`.
pub fn analyze(ledger: &Ledger, config: &CorrelationConfig) -> Result<Vec<CorrelationPair>> {
    let pivot = ledger.monthly_pivot();
    let months = pivot.months.len();

    let columns: Vec<(&String, &Vec<f64>)> = pivot
        .columns
        .iter()
        .filter(|(_, series)| {
            series.iter().filter(|v| **v > 0.0).count() >= config.min_nonzero_months
        })
        .collect();

    let mut pairs = vec![];
    for (i, (cat_a, a)) in columns.iter().enumerate() {
        for (cat_b, b) in &columns[i + 1..] {
            let Some(r) = stats::pearson(a, b) else {
                continue;
            };
            if !r.is_finite() {
                return Err(Error::tool(
                    "correlation_engine",
                    format!("non-finite coefficient for {} / {}", cat_a, cat_b),
                ));
            }
            if r.abs() < config.min_abs_r {
                continue;
            }
            let confidence = if r.abs() >= config.high_abs_r && months >= config.high_min_months {
                Confidence::High
            } else {
                Confidence::Medium
            };
            pairs.push(CorrelationPair {
                category_a: cat_a.to_string(),
                category_b: cat_b.to_string(),
                correlation: round_to(r, 2),
                months,
                confidence,
                interpretation: interpret(r, cat_a, cat_b, config.high_abs_r),
            });
        }
    }

    pairs.sort_by(|x, y| {
        y.correlation
            .abs()
            .total_cmp(&x.correlation.abs())
            .then_with(|| x.category_a.cmp(&y.category_a))
            .then_with(|| x.category_b.cmp(&y.category_b))
    });
    Ok(pairs)
}

/// Plain-language reading of a coefficient; the sign picks the framing
pub fn interpret(r: f64, a: &str, b: &str, strong_at: f64) -> String {
    let strength = if r.abs() > strong_at {
        "strongly"
    } else {
        "moderately"
    };
    if r > 0.0 {
        format!("{} and {} {} move together (r={:.2})", a, b, strength, r)
    } else {
        format!(
            "When {} spending increases, {} drops {} (r={:.2})",
            a, b, strength, r
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transaction;
    use chrono::NaiveDate;

    fn ledger_from(series: &[(&str, Vec<f64>)]) -> Ledger {
        let mut txs = vec![];
        for (cat, values) in series {
            for (i, v) in values.iter().enumerate() {
                if *v > 0.0 {
                    let date = NaiveDate::from_ymd_opt(2024, 1 + i as u32, 10).unwrap();
                    txs.push(Transaction::new(date, format!("{} PLACE", cat), *v, *cat));
                }
            }
        }
        Ledger::new(txs)
    }

    #[test]
    fn test_exact_inverse_is_high_confidence() {
        let groceries: Vec<f64> = (0..8).map(|i| 100.0 + 20.0 * i as f64).collect();
        let delivery: Vec<f64> = groceries.iter().map(|g| 400.0 - g).collect();
        let ledger = ledger_from(&[
            ("Groceries", groceries),
            ("Delivery", delivery),
            ("Shopping", vec![50.0, 90.0, 40.0, 95.0, 60.0, 45.0, 80.0, 55.0]),
        ]);

        let pairs = analyze(&ledger, &CorrelationConfig::default()).unwrap();
        let pair = pairs
            .iter()
            .find(|p| p.category_a == "Delivery" && p.category_b == "Groceries")
            .unwrap();
        assert!((pair.correlation + 1.0).abs() < 1e-9);
        assert_eq!(pair.confidence, Confidence::High);
        assert!(pair.interpretation.starts_with("When Delivery spending increases"));
        assert_eq!(pairs[0].category_a, "Delivery");
    }

    #[test]
    fn test_inverse_pair_ledger() {
        let ledger = crate::test_utils::inverse_pair_ledger(8);
        let pairs = analyze(&ledger, &CorrelationConfig::default()).unwrap();

        let pair = pairs.iter().find(|p| p.involves("Delivery") && p.involves("Groceries")).unwrap();
        assert!((pair.correlation + 1.0).abs() < 1e-9);
        assert_eq!(pair.months, 8);
    }

    #[test]
    fn test_weak_pairs_dropped_and_ordering() {
        let ledger = ledger_from(&[
            ("Dining", vec![100.0, 200.0, 300.0, 400.0]),
            ("Entertainment", vec![50.0, 110.0, 140.0, 210.0]),
            ("Groceries", vec![300.0, 300.0, 301.0, 300.0]),
        ]);
        let pairs = analyze(&ledger, &CorrelationConfig::default()).unwrap();

        for p in &pairs {
            assert!(p.category_a < p.category_b);
            assert!(p.correlation.abs() >= 0.5);
        }
        let first = &pairs[0];
        assert_eq!((first.category_a.as_str(), first.category_b.as_str()), ("Dining", "Entertainment"));
        // only four months, so never HIGH
        assert_eq!(first.confidence, Confidence::Medium);
        assert!(first.interpretation.contains("move together"));
    }

    #[test]
    fn test_sparse_categories_excluded() {
        let ledger = ledger_from(&[
            ("Dining", vec![100.0, 200.0, 300.0, 400.0]),
            ("Travel", vec![0.0, 0.0, 900.0, 0.0]),
            ("Shopping", vec![10.0, 20.0, 30.0, 40.0]),
        ]);
        let pairs = analyze(&ledger, &CorrelationConfig::default()).unwrap();
        assert!(pairs.iter().all(|p| !p.involves("Travel")));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].partner_of("Dining"), Some("Shopping"));
    }
}
