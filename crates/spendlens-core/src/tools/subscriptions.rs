//! Subscription hunter
//!
//! Finds recurring charges by merchant, then checks each one for price creep
//! and groups them into overlapping services (two music apps, three video
//! streamers). Recurring entries point at their creep/overlap findings by key
//! instead of repeating the data.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::SubscriptionConfig;
use crate::error::Result;
use crate::models::{normalize_merchant, Confidence, Ledger, Transaction, YearMonth};
use crate::stats::{self, round_to};

/// Categories where repeat visits are normal, so recurrence needs a steadier amount
const HABIT_CATEGORIES: &[&str] = &["dining", "groceries", "delivery", "shopping", "transport"];

/// Subscription categories where holding several at once is expected
const ESSENTIAL_SUBSCRIPTION_CATEGORIES: &[&str] = &[
    "bills & utilities",
    "insurance",
    "health",
    "transport",
    "rent & housing",
    "education",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Charges per year
    pub fn per_year(&self) -> f64 {
        match self {
            Frequency::Weekly => 52.0,
            Frequency::Biweekly => 26.0,
            Frequency::Monthly => 12.0,
            Frequency::Yearly => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurringCharge {
    pub merchant: String,
    pub category: String,
    pub frequency: Frequency,
    pub amount: f64,
    pub occurrences: usize,
    pub annual_cost: f64,
    pub first_charge: NaiveDate,
    pub last_charge: NaiveDate,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_creep_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricePoint {
    pub month: YearMonth,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceCreep {
    pub merchant: String,
    pub price_creep_detected: bool,
    pub original_price: f64,
    pub current_price: f64,
    pub total_increase_pct: f64,
    pub annual_cost_increase: f64,
    pub price_history: Vec<PricePoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlapMember {
    pub merchant: String,
    pub annual_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overlap {
    pub category: String,
    pub count: usize,
    pub subscriptions: Vec<OverlapMember>,
    pub combined_annual: f64,
    /// Cost of every member except the cheapest
    pub potential_savings: f64,
    /// Cheapest member, the one kept when computing savings
    pub keep: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionReport {
    pub recurring: Vec<RecurringCharge>,
    pub price_creep: Vec<PriceCreep>,
    pub overlaps: Vec<Overlap>,
}

impl SubscriptionReport {
    pub fn confidence(&self) -> Confidence {
        if self.recurring.iter().any(|r| r.confidence == Confidence::High) {
            Confidence::High
        } else if self.recurring.is_empty() {
            Confidence::Low
        } else {
            Confidence::Medium
        }
    }

    pub fn total_annual(&self) -> f64 {
        round_to(self.recurring.iter().map(|r| r.annual_cost).sum(), 2)
    }

    pub fn find(&self, merchant: &str) -> Option<&RecurringCharge> {
        let key = normalize_merchant(merchant);
        self.recurring.iter().find(|r| r.merchant == key)
    }
}

pub fn analyze(ledger: &Ledger, config: &SubscriptionConfig) -> Result<SubscriptionReport> {
    let groups = group_by_merchant(ledger);

    let mut recurring = vec![];
    let mut price_creep = vec![];
    for (merchant, rows) in &groups {
        let Some(mut charge) = detect_recurring(merchant, rows, config) else {
            continue;
        };
        if let Some(creep) = detect_price_creep(merchant, rows, charge.frequency, config) {
            charge.price_creep_ref = Some(creep.merchant.clone());
            price_creep.push(creep);
        }
        recurring.push(charge);
    }

    let overlaps = detect_overlaps(&recurring);
    for overlap in &overlaps {
        for charge in recurring.iter_mut() {
            if overlap.subscriptions.iter().any(|m| m.merchant == charge.merchant) {
                charge.overlap_ref = Some(overlap.category.clone());
            }
        }
    }

    recurring.sort_by(|a, b| {
        b.annual_cost
            .total_cmp(&a.annual_cost)
            .then_with(|| a.merchant.cmp(&b.merchant))
    });
    price_creep.sort_by(|a, b| {
        b.annual_cost_increase
            .total_cmp(&a.annual_cost_increase)
            .then_with(|| a.merchant.cmp(&b.merchant))
    });

    tracing::debug!(
        recurring = recurring.len(),
        price_creep = price_creep.len(),
        overlaps = overlaps.len(),
        "Subscription scan complete"
    );

    Ok(SubscriptionReport {
        recurring,
        price_creep,
        overlaps,
    })
}

fn group_by_merchant(ledger: &Ledger) -> BTreeMap<String, Vec<&Transaction>> {
    let mut groups: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
    for t in ledger.spending().filter(|t| t.amount > 0.0) {
        groups
            .entry(normalize_merchant(&t.merchant))
            .or_default()
            .push(t);
    }
    groups
}

/// Classify a merchant's charges as recurring, or None
///
/// Needs a near-constant amount and a regular interval. A provider recurring
/// hint relaxes the interval-jitter check for monthly charges.
pub fn detect_recurring(
    merchant: &str,
    rows: &[&Transaction],
    config: &SubscriptionConfig,
) -> Option<RecurringCharge> {
    if rows.len() < config.min_occurrences.max(2) {
        return None;
    }
    let amounts: Vec<f64> = rows.iter().map(|t| t.amount).collect();
    let mean_amount = stats::mean(&amounts);
    if mean_amount < config.min_amount {
        return None;
    }
    let amount_cv = stats::cv(&amounts);
    if amount_cv > config.max_amount_cv {
        return None;
    }

    let category = rows[0].category.clone();
    if HABIT_CATEGORIES.contains(&category.to_lowercase().as_str())
        && amount_cv > config.habit_max_amount_cv
    {
        return None;
    }

    let gaps: Vec<f64> = rows
        .windows(2)
        .map(|w| (w[1].date - w[0].date).num_days() as f64)
        .collect();
    let avg_gap = stats::mean(&gaps);
    let gap_std = stats::std_dev(&gaps);
    let hinted = rows.iter().all(|t| t.is_recurring_hint);

    let frequency = match avg_gap {
        g if (25.0..=35.0).contains(&g) && (gap_std < 5.0 || hinted) => Frequency::Monthly,
        g if (350.0..=380.0).contains(&g) => Frequency::Yearly,
        g if (12.0..=16.0).contains(&g) => Frequency::Biweekly,
        g if (6.0..=8.0).contains(&g) => Frequency::Weekly,
        _ => return None,
    };

    let confidence = match rows.len() {
        n if n >= 3 && amount_cv <= 0.05 => Confidence::High,
        n if n >= 3 => Confidence::Medium,
        _ => Confidence::Low,
    };

    Some(RecurringCharge {
        merchant: merchant.to_string(),
        category,
        frequency,
        amount: round_to(mean_amount, 2),
        occurrences: rows.len(),
        annual_cost: round_to(mean_amount * frequency.per_year(), 2),
        first_charge: rows[0].date,
        last_charge: rows[rows.len() - 1].date,
        confidence,
        price_creep_ref: None,
        overlap_ref: None,
    })
}

/// Compare the first and latest monthly price of a recurring charge
pub fn detect_price_creep(
    merchant: &str,
    rows: &[&Transaction],
    frequency: Frequency,
    config: &SubscriptionConfig,
) -> Option<PriceCreep> {
    if rows.len() < config.price_creep_min_charges {
        return None;
    }

    let mut by_month: BTreeMap<YearMonth, Vec<f64>> = BTreeMap::new();
    for t in rows {
        by_month.entry(t.month()).or_default().push(t.amount);
    }
    let history: Vec<PricePoint> = by_month
        .into_iter()
        .map(|(month, amounts)| PricePoint {
            month,
            amount: stats::mean(&amounts),
        })
        .collect();

    let original = history.first()?.amount;
    let current = history.last()?.amount;
    if original <= 0.0 {
        return None;
    }
    let increase_pct = (current - original) / original * 100.0;
    if increase_pct <= config.price_creep_threshold_pct {
        return None;
    }

    Some(PriceCreep {
        merchant: merchant.to_string(),
        price_creep_detected: true,
        original_price: round_to(original, 2),
        current_price: round_to(current, 2),
        total_increase_pct: round_to(increase_pct, 1),
        annual_cost_increase: round_to((current - original) * frequency.per_year(), 2),
        price_history: history
            .into_iter()
            .map(|p| PricePoint {
                month: p.month,
                amount: round_to(p.amount, 2),
            })
            .collect(),
    })
}

/// Service family for well-known subscription merchants
pub fn service_category(merchant: &str) -> Option<&'static str> {
    let m = merchant.to_uppercase();
    let families: [(&str, &[&str]); 5] = [
        (
            "Streaming",
            &[
                "NETFLIX",
                "HULU",
                "DISNEY",
                "HBO",
                "MAX.COM",
                "PARAMOUNT",
                "PEACOCK",
                "PRIME VIDEO",
                "APPLE TV",
            ],
        ),
        (
            "Music",
            &["SPOTIFY", "APPLE MUSIC", "TIDAL", "PANDORA", "YOUTUBE MUSIC"],
        ),
        (
            "Cloud Storage",
            &["ICLOUD", "GOOGLE ONE", "DROPBOX", "ONEDRIVE", "BOX.COM"],
        ),
        (
            "News",
            &["NYT", "NEW YORK TIMES", "WSJ", "WASHINGTON POST", "SUBSTACK"],
        ),
        (
            "Fitness",
            &["PELOTON", "STRAVA", "FITBIT", "MYFITNESSPAL", "HEADSPACE", "CALM"],
        ),
    ];

    families
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| m.contains(k)))
        .map(|(family, _)| *family)
}

/// Group recurring charges sharing a service family (or category)
pub fn detect_overlaps(recurring: &[RecurringCharge]) -> Vec<Overlap> {
    let mut groups: BTreeMap<String, Vec<&RecurringCharge>> = BTreeMap::new();
    for charge in recurring {
        let family = service_category(&charge.merchant)
            .map(str::to_string)
            .unwrap_or_else(|| charge.category.clone());
        if family.is_empty()
            || ESSENTIAL_SUBSCRIPTION_CATEGORIES.contains(&family.to_lowercase().as_str())
        {
            continue;
        }
        groups.entry(family).or_default().push(charge);
    }

    let mut overlaps: Vec<Overlap> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .filter_map(|(category, members)| {
            let cheapest = members.iter().min_by(|a, b| {
                a.annual_cost
                    .total_cmp(&b.annual_cost)
                    .then_with(|| a.merchant.cmp(&b.merchant))
            })?;
            let combined: f64 = members.iter().map(|m| m.annual_cost).sum();
            Some(Overlap {
                count: members.len(),
                subscriptions: members
                    .iter()
                    .map(|m| OverlapMember {
                        merchant: m.merchant.clone(),
                        annual_cost: m.annual_cost,
                    })
                    .collect(),
                combined_annual: round_to(combined, 2),
                potential_savings: round_to(combined - cheapest.annual_cost, 2),
                keep: cheapest.merchant.clone(),
                category,
            })
        })
        .collect();

    overlaps.sort_by(|a, b| {
        b.combined_annual
            .total_cmp(&a.combined_annual)
            .then_with(|| a.category.cmp(&b.category))
    });
    overlaps
}
