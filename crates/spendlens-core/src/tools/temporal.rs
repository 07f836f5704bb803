//! Temporal patterns: payday front-loading, weekday vs weekend, seasonality
//!
//! Each sub-analysis is gated on its own; one that may not run is left out
//! of the report rather than failing the tool.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::config::TemporalConfig;
use crate::error::Result;
use crate::gate::{GateDecision, PAYDAY, SEASONAL, WEEKLY};
use crate::models::{is_essential, Confidence, Ledger};
use crate::profile::{MonthlyTotal, Profile};
use crate::stats::{self, round_to};

#[derive(Debug, Clone, Serialize)]
pub struct PaydayPattern {
    pub payday_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payday_day_of_month: Option<u32>,
    pub spending_in_first_7_days_pct: f64,
    pub pattern_consistency: f64,
    pub cycles_analyzed: usize,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAverage {
    pub day: String,
    pub avg: f64,
    pub transactions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyPattern {
    pub weekday_avg: f64,
    pub weekend_avg: f64,
    pub weekend_spending_multiple: f64,
    pub highest_spending_day: String,
    pub lowest_spending_day: String,
    pub day_averages: Vec<DayAverage>,
    /// Share of amount variance explained by the day of week
    pub pattern_strength: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonalPattern {
    pub seasonal_detected: bool,
    pub monthly_totals: Vec<MonthlyTotal>,
    pub peak_month: String,
    pub peak_amount: f64,
    pub low_month: String,
    pub low_amount: f64,
    pub avg_monthly: f64,
    pub seasonality_strength: f64,
    pub months_analyzed: usize,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TemporalReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payday: Option<PaydayPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<WeeklyPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal: Option<SeasonalPattern>,
}

impl TemporalReport {
    /// Seasonal confidence (driven by history length), else payday's, else LOW
    pub fn confidence(&self) -> Confidence {
        if let Some(seasonal) = &self.seasonal {
            return seasonal.confidence;
        }
        match &self.payday {
            Some(p) if p.payday_detected => p.confidence,
            _ => Confidence::Low,
        }
    }
}

pub fn analyze(
    ledger: &Ledger,
    profile: &Profile,
    config: &TemporalConfig,
    decision: &GateDecision,
) -> Result<TemporalReport> {
    Ok(TemporalReport {
        payday: decision
            .allows(PAYDAY)
            .then(|| detect_payday(ledger, config)),
        weekly: if decision.allows(WEEKLY) {
            detect_weekly(ledger)
        } else {
            None
        },
        seasonal: if decision.allows(SEASONAL) {
            detect_seasonal(profile, config)
        } else {
            None
        },
    })
}

/// Share of non-essential spend landing in the first days after each deposit
pub fn detect_payday(ledger: &Ledger, config: &TemporalConfig) -> PaydayPattern {
    let mut paydays: Vec<NaiveDate> = ledger.income().map(|t| t.date).collect();
    paydays.dedup();

    let spend: Vec<(NaiveDate, f64)> = ledger
        .spending()
        .filter(|t| !is_essential(&t.category))
        .map(|t| (t.date, t.amount))
        .collect();

    let window = Duration::days(config.payday_window_days);
    let cycle = Duration::days(config.payday_cycle_days);

    // a cycle runs to the next deposit, capped at the configured length
    let shares: Vec<f64> = paydays
        .iter()
        .enumerate()
        .filter_map(|(i, &pay)| {
            let sum_until = |end: NaiveDate| -> f64 {
                spend
                    .iter()
                    .filter(|(d, _)| *d >= pay && *d < end)
                    .map(|(_, a)| a)
                    .sum()
            };
            let cycle_end = paydays
                .get(i + 1)
                .map_or(pay + cycle, |&next| next.min(pay + cycle));
            let cycle_total = sum_until(cycle_end);
            (cycle_total > 0.0).then(|| sum_until(pay + window) / cycle_total)
        })
        .collect();

    let day_of_month = mode_day(&paydays);

    if shares.len() < config.payday_min_cycles {
        return PaydayPattern {
            payday_detected: false,
            payday_day_of_month: day_of_month,
            spending_in_first_7_days_pct: round_to(stats::mean(&shares) * 100.0, 1),
            pattern_consistency: 0.0,
            cycles_analyzed: shares.len(),
            confidence: Confidence::Low,
            reason: Some(format!(
                "Need {}+ pay cycles with spending, have {}",
                config.payday_min_cycles,
                shares.len()
            )),
        };
    }

    let front_loaded = shares
        .iter()
        .filter(|&&s| s > config.payday_front_load_share)
        .count();
    let consistency = front_loaded as f64 / shares.len() as f64;
    let detected = consistency >= config.payday_min_consistency;

    let confidence = match consistency {
        c if detected && c >= 0.8 && shares.len() >= 6 => Confidence::High,
        _ if detected => Confidence::Medium,
        _ => Confidence::Low,
    };

    PaydayPattern {
        payday_detected: detected,
        payday_day_of_month: day_of_month,
        spending_in_first_7_days_pct: round_to(stats::mean(&shares) * 100.0, 1),
        pattern_consistency: round_to(consistency, 2),
        cycles_analyzed: shares.len(),
        confidence,
        reason: (!detected).then(|| {
            format!(
                "Pattern too weak ({:.0}% of cycles front-loaded)",
                consistency * 100.0
            )
        }),
    }
}

/// Most common day of month; ties go to the earliest day
fn mode_day(dates: &[NaiveDate]) -> Option<u32> {
    let mut counts = [0usize; 32];
    for d in dates {
        counts[d.day() as usize] += 1;
    }
    let best = *counts.iter().max()?;
    if best == 0 {
        return None;
    }
    counts.iter().position(|&c| c == best).map(|d| d as u32)
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Average transaction amount per weekday
pub fn detect_weekly(ledger: &Ledger) -> Option<WeeklyPattern> {
    let mut buckets: [Vec<f64>; 7] = Default::default();
    for t in ledger.spending() {
        buckets[t.date.weekday().num_days_from_monday() as usize].push(t.amount);
    }
    let all: Vec<f64> = buckets.iter().flatten().copied().collect();
    if all.is_empty() {
        return None;
    }

    let averages: Vec<Option<f64>> = buckets
        .iter()
        .map(|b| (!b.is_empty()).then(|| stats::mean(b)))
        .collect();

    let bucket_mean = |range: std::ops::Range<usize>| {
        let present: Vec<f64> = averages[range].iter().flatten().copied().collect();
        stats::mean(&present)
    };
    let weekday_avg = bucket_mean(0..5);
    let weekend_avg = bucket_mean(5..7);
    let multiple = if weekday_avg > 0.0 {
        round_to(weekend_avg / weekday_avg, 2)
    } else {
        1.0
    };

    let mut highest: Option<(usize, f64)> = None;
    let mut lowest: Option<(usize, f64)> = None;
    for (i, avg) in averages.iter().enumerate() {
        let Some(avg) = *avg else { continue };
        if highest.map_or(true, |(_, h)| avg > h) {
            highest = Some((i, avg));
        }
        if lowest.map_or(true, |(_, l)| avg < l) {
            lowest = Some((i, avg));
        }
    }

    let overall = stats::mean(&all);
    let ss_between: f64 = buckets
        .iter()
        .zip(&averages)
        .filter_map(|(b, avg)| avg.map(|a| b.len() as f64 * (a - overall).powi(2)))
        .sum();
    let ss_total: f64 = all.iter().map(|x| (x - overall).powi(2)).sum();
    let strength = if ss_total > 0.0 {
        round_to(ss_between / ss_total, 2)
    } else {
        0.0
    };

    let name_of = |slot: Option<(usize, f64)>| {
        slot.map(|(i, _)| day_name(WEEK[i]).to_string())
            .unwrap_or_default()
    };

    Some(WeeklyPattern {
        weekday_avg: round_to(weekday_avg, 2),
        weekend_avg: round_to(weekend_avg, 2),
        weekend_spending_multiple: multiple,
        highest_spending_day: name_of(highest),
        lowest_spending_day: name_of(lowest),
        day_averages: WEEK
            .iter()
            .zip(&buckets)
            .zip(&averages)
            .filter_map(|((day, bucket), avg)| {
                avg.map(|a| DayAverage {
                    day: day_name(*day).to_string(),
                    avg: round_to(a, 2),
                    transactions: bucket.len(),
                })
            })
            .collect(),
        pattern_strength: strength,
    })
}

/// Month-to-month variation of total spend
pub fn detect_seasonal(profile: &Profile, config: &TemporalConfig) -> Option<SeasonalPattern> {
    let peak = profile.highest_month.as_ref()?;
    let low = profile.lowest_month.as_ref()?;
    let totals: Vec<f64> = profile.monthly_totals.iter().map(|m| m.total).collect();
    let cv = stats::cv(&totals);

    let confidence = match profile.date_range_days {
        d if d >= 730 => Confidence::High,
        d if d >= 365 => Confidence::Medium,
        _ => Confidence::Low,
    };

    Some(SeasonalPattern {
        seasonal_detected: cv >= config.seasonal_cv_threshold,
        monthly_totals: profile.monthly_totals.clone(),
        peak_month: peak.month.label(),
        peak_amount: peak.total,
        low_month: low.month.label(),
        low_amount: low.total,
        avg_monthly: round_to(stats::mean(&totals), 2),
        seasonality_strength: round_to(cv, 2),
        months_analyzed: totals.len(),
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::gate;
    use crate::models::Transaction;
    use crate::profile::Profiler;
    use crate::tools::ToolKind;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Six months paid on the 1st; most dining lands in the first week
    fn front_loaded_ledger() -> Ledger {
        let mut txs = vec![];
        for m in 1..=6 {
            txs.push(Transaction::new(d(2024, m, 1), "ACME PAYROLL", 3000.0, "Income"));
            txs.push(Transaction::new(d(2024, m, 2), "BISTRO", 200.0, "Dining"));
            txs.push(Transaction::new(d(2024, m, 4), "MALL", 150.0, "Shopping"));
            txs.push(Transaction::new(d(2024, m, 20), "CAFE", 30.0, "Dining"));
            // essential spend does not count toward the share
            txs.push(Transaction::new(d(2024, m, 25), "LANDLORD", 1500.0, "Rent & Housing"));
        }
        Ledger::new(txs)
    }

    #[test]
    fn test_payday_detected() {
        let payday = detect_payday(&front_loaded_ledger(), &TemporalConfig::default());
        assert!(payday.payday_detected);
        assert_eq!(payday.payday_day_of_month, Some(1));
        assert_eq!(payday.cycles_analyzed, 6);
        assert_eq!(payday.pattern_consistency, 1.0);
        // 350 of 380 in the first week
        assert!((payday.spending_in_first_7_days_pct - 92.1).abs() < 0.1);
        assert_eq!(payday.confidence, Confidence::High);
    }

    #[test]
    fn test_payday_needs_cycles() {
        let ledger = Ledger::new(vec![
            Transaction::new(d(2024, 1, 1), "ACME PAYROLL", 3000.0, "Income"),
            Transaction::new(d(2024, 1, 2), "BISTRO", 200.0, "Dining"),
        ]);
        let payday = detect_payday(&ledger, &TemporalConfig::default());
        assert!(!payday.payday_detected);
        assert_eq!(payday.cycles_analyzed, 1);
        assert!(payday.reason.unwrap().contains("3+"));
    }

    #[test]
    fn test_weekly_pattern() {
        // 2024-01-06 is a Saturday, 2024-01-08 a Monday
        let ledger = Ledger::new(vec![
            Transaction::new(d(2024, 1, 6), "BAR", 90.0, "Dining"),
            Transaction::new(d(2024, 1, 7), "BRUNCH", 60.0, "Dining"),
            Transaction::new(d(2024, 1, 8), "CAFE", 10.0, "Dining"),
            Transaction::new(d(2024, 1, 9), "CAFE", 20.0, "Dining"),
            Transaction::new(d(2024, 1, 10), "ACME PAYROLL", 5000.0, "Income"),
        ]);
        let weekly = detect_weekly(&ledger).unwrap();

        assert_eq!(weekly.weekday_avg, 15.0);
        assert_eq!(weekly.weekend_avg, 75.0);
        assert_eq!(weekly.weekend_spending_multiple, 5.0);
        assert_eq!(weekly.highest_spending_day, "Saturday");
        assert_eq!(weekly.lowest_spending_day, "Monday");
        assert_eq!(weekly.day_averages.len(), 4);
        assert!(weekly.pattern_strength > 0.9);
    }

    #[test]
    fn test_seasonal_uses_cv() {
        let flat = Ledger::new(
            (1..=4)
                .map(|m| Transaction::new(d(2024, m, 10), "MARKET", 100.0, "Groceries"))
                .collect(),
        );
        let profile = Profiler::new().profile(&flat).unwrap();
        let seasonal = detect_seasonal(&profile, &TemporalConfig::default()).unwrap();
        assert!(!seasonal.seasonal_detected);
        assert_eq!(seasonal.months_analyzed, 4);

        let bumpy = Ledger::new(vec![
            Transaction::new(d(2024, 1, 10), "MARKET", 100.0, "Groceries"),
            Transaction::new(d(2024, 2, 10), "MARKET", 100.0, "Groceries"),
            Transaction::new(d(2024, 12, 10), "TOY STORE", 600.0, "Shopping"),
        ]);
        let profile = Profiler::new().profile(&bumpy).unwrap();
        let seasonal = detect_seasonal(&profile, &TemporalConfig::default()).unwrap();
        assert!(seasonal.seasonal_detected);
        assert_eq!(seasonal.peak_month, "December 2024");
        assert_eq!(seasonal.low_month, "January 2024");
        assert_eq!(seasonal.confidence, Confidence::Low);
    }

    #[test]
    fn test_gated_sub_analyses_are_omitted() {
        let ledger = Ledger::new(vec![
            Transaction::new(d(2024, 1, 10), "CAFE", 10.0, "Dining"),
            Transaction::new(d(2024, 2, 10), "CAFE", 12.0, "Dining"),
        ]);
        let profile = Profiler::new().profile(&ledger).unwrap();
        let decision = gate::check(ToolKind::TemporalPatterns, &profile, &GateConfig::default());
        let report = analyze(&ledger, &profile, &TemporalConfig::default(), &decision).unwrap();

        assert!(report.payday.is_none());
        assert!(report.seasonal.is_none());
        assert!(report.weekly.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("seasonal").is_none());
        assert!(json.get("weekly").is_some());
    }
}
