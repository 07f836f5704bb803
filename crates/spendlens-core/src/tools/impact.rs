//! Spending-impact attribution
//!
//! Splits month-to-month variation in total spend across categories using
//! each category's covariance with the total. The shares sum to 100. The fit
//! is checked by regressing the total on the sum of the top drivers; a weak
//! fit marks the model invalid and its impacts are withheld.

use serde::Serialize;

use crate::config::ImpactConfig;
use crate::error::Result;
use crate::models::{Confidence, Ledger};
use crate::stats::{self, round_to};

#[derive(Debug, Clone, Serialize)]
pub struct CategoryImpact {
    pub category: String,
    /// Share of total monthly variance attributed to this category
    pub impact_pct: f64,
    pub monthly_avg: f64,
    pub monthly_std: f64,
    pub cv: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendingImpact {
    pub model_valid: bool,
    pub r_squared: f64,
    pub months_analyzed: usize,
    pub impacts: Vec<CategoryImpact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub confidence: Confidence,
}

impl SpendingImpact {
    fn invalid(months: usize, r_squared: f64, reason: String) -> Self {
        Self {
            model_valid: false,
            r_squared,
            months_analyzed: months,
            impacts: vec![],
            reason: Some(reason),
            confidence: Confidence::Low,
        }
    }

    pub fn get(&self, category: &str) -> Option<&CategoryImpact> {
        self.impacts
            .iter()
            .find(|i| i.category.eq_ignore_ascii_case(category))
    }
}

pub fn analyze(ledger: &Ledger, config: &ImpactConfig) -> Result<SpendingImpact> {
    let pivot = ledger.monthly_pivot();
    let months = pivot.months.len();
    let totals = pivot.totals();
    let total_var = stats::covariance(&totals, &totals);

    if total_var < 1e-9 {
        return Ok(SpendingImpact::invalid(
            months,
            0.0,
            "No month-to-month spending variation to attribute".into(),
        ));
    }

    let mut impacts: Vec<CategoryImpact> = pivot
        .columns
        .iter()
        .filter(|(_, series)| series.iter().any(|v| *v > 0.0))
        .map(|(category, series)| {
            let avg = stats::mean(series);
            let std = stats::std_dev(series);
            CategoryImpact {
                category: category.clone(),
                impact_pct: round_to(stats::covariance(series, &totals) / total_var * 100.0, 1),
                monthly_avg: round_to(avg, 2),
                monthly_std: round_to(std, 2),
                cv: if avg > 0.0 { round_to(std / avg, 3) } else { 0.0 },
            }
        })
        .collect();
    impacts.sort_by(|a, b| {
        b.impact_pct
            .total_cmp(&a.impact_pct)
            .then_with(|| a.category.cmp(&b.category))
    });

    let drivers: Vec<&str> = impacts
        .iter()
        .take(config.top_drivers.max(1))
        .map(|i| i.category.as_str())
        .collect();
    let driver_sum: Vec<f64> = (0..months)
        .map(|m| {
            drivers
                .iter()
                .filter_map(|c| pivot.series(c))
                .map(|series| series[m])
                .sum()
        })
        .collect();
    let r_squared = stats::pearson(&driver_sum, &totals)
        .map(|r| r * r)
        .unwrap_or(0.0);

    if r_squared < config.min_r_squared {
        return Ok(SpendingImpact::invalid(
            months,
            round_to(r_squared, 3),
            format!(
                "Top {} categories explain only {:.0}% of monthly variation",
                drivers.len(),
                r_squared * 100.0
            ),
        ));
    }

    let confidence = if months >= config.high_confidence_months {
        Confidence::High
    } else {
        Confidence::Medium
    };

    Ok(SpendingImpact {
        model_valid: true,
        r_squared: round_to(r_squared, 3),
        months_analyzed: months,
        impacts,
        reason: None,
        confidence,
    })
}
