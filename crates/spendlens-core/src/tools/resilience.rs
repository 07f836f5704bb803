//! Financial resilience: runway, job-loss stress test, spending projections
//!
//! Monthly spend per category is modelled as Normal(mean, std) fitted on the
//! monthly pivot. Sampling uses a generator seeded from the ledger
//! fingerprint, so the same ledger always produces the same intervals.

use std::collections::BTreeMap;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::config::ResilienceConfig;
use crate::error::{Error, Result};
use crate::gate::{GateDecision, RUNWAY};
use crate::models::{is_discretionary, is_essential, Ledger};
use crate::profile::Profile;
use crate::stats::{self, round_to};

const TOOL: &str = "financial_resilience";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunwayStatus {
    Surplus,
    Deficit,
}

#[derive(Debug, Clone, Serialize)]
pub struct Runway {
    pub months_of_runway: f64,
    pub status: RunwayStatus,
    pub monthly_burn: f64,
    pub monthly_income: f64,
    pub net_monthly: f64,
    pub estimated_savings: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunwayInterval {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CutCandidate {
    pub category: String,
    pub monthly_avg: f64,
    pub potential_savings: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressTest {
    pub scenario: &'static str,
    pub months_of_runway: f64,
    pub runway_ci: RunwayInterval,
    pub estimated_savings: f64,
    pub minimum_monthly_budget: f64,
    pub categories_to_cut: Vec<CutCandidate>,
    pub revised_monthly_budget: f64,
    pub simulations: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResilienceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runway: Option<Runway>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_test: Option<StressTest>,
}

/// Fitted monthly spend for one category
#[derive(Debug, Clone, Copy)]
struct MonthlyDistribution {
    mean: f64,
    std: f64,
}

pub fn analyze(
    ledger: &Ledger,
    profile: &Profile,
    config: &ResilienceConfig,
    decision: &GateDecision,
) -> Result<ResilienceReport> {
    let runway = if decision.allows(RUNWAY) {
        calculate_runway(ledger, profile, config)
    } else {
        None
    };
    Ok(ResilienceReport {
        runway,
        stress_test: stress_test(ledger, config)?,
    })
}

/// Savings left over from the observed period
fn estimated_savings(ledger: &Ledger) -> f64 {
    let income: f64 = ledger.income().map(|t| t.amount.abs()).sum();
    let spend: f64 = ledger.spending().map(|t| t.amount).sum();
    (income - spend).max(0.0)
}

/// Months the observed savings last at the current burn
///
/// In deficit the gap between burn and income drains savings. In surplus the
/// figure answers "how long if income stopped".
pub fn calculate_runway(
    ledger: &Ledger,
    profile: &Profile,
    config: &ResilienceConfig,
) -> Option<Runway> {
    let months = profile.months_count.max(1) as f64;
    let total_spend: f64 = ledger.spending().map(|t| t.amount).sum();
    let total_income: f64 = ledger.income().map(|t| t.amount.abs()).sum();
    let burn = total_spend / months;
    if burn <= 0.0 {
        return None;
    }
    let income = total_income / months;
    let net = income - burn;
    let savings = estimated_savings(ledger);

    let (months_of_runway, status) = if net > 0.0 {
        (savings / burn, RunwayStatus::Surplus)
    } else {
        (
            savings / (burn - income).max(config.runway_epsilon),
            RunwayStatus::Deficit,
        )
    };

    Some(Runway {
        months_of_runway: round_to(months_of_runway.max(0.0), 1),
        status,
        monthly_burn: round_to(burn, 2),
        monthly_income: round_to(income, 2),
        net_monthly: round_to(net, 2),
        estimated_savings: round_to(savings, 2),
    })
}

fn distributions(ledger: &Ledger, config: &ResilienceConfig) -> BTreeMap<String, MonthlyDistribution> {
    let pivot = ledger.monthly_pivot();
    pivot
        .columns
        .iter()
        .filter_map(|(category, series)| {
            let mean = stats::mean(series);
            if mean <= 0.0 {
                return None;
            }
            let std = if series.len() > 1 {
                stats::std_dev(series)
            } else {
                mean * 0.15
            };
            Some((
                category.clone(),
                MonthlyDistribution {
                    mean,
                    std: std.max(config.min_std),
                },
            ))
        })
        .collect()
}

/// Simulated total spend per month, one row per simulation
fn simulate(
    dists: &BTreeMap<String, MonthlyDistribution>,
    simulations: usize,
    months: usize,
    seed: u64,
) -> Result<Vec<Vec<f64>>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let samplers = dists
        .iter()
        .map(|(category, d)| {
            Normal::new(d.mean, d.std).map_err(|e| {
                Error::tool(TOOL, format!("bad distribution for {}: {}", category, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let paths = (0..simulations)
        .map(|_| {
            (0..months)
                .map(|_| {
                    samplers
                        .iter()
                        .map(|n| n.sample(&mut rng).max(0.0))
                        .sum::<f64>()
                })
                .collect()
        })
        .collect();
    Ok(paths)
}

/// Job-loss stress test: how long savings cover spending with no income
pub fn stress_test(ledger: &Ledger, config: &ResilienceConfig) -> Result<Option<StressTest>> {
    let dists = distributions(ledger, config);
    if dists.is_empty() {
        return Ok(None);
    }
    let savings = estimated_savings(ledger);
    let horizon = config.horizon_months;
    let paths = simulate(&dists, config.simulations, horizon, ledger.seed())?;

    let runways: Vec<f64> = paths
        .iter()
        .map(|path| {
            let mut cumulative = 0.0;
            path.iter()
                .position(|spend| {
                    cumulative += spend;
                    cumulative > savings
                })
                .unwrap_or(horizon) as f64
        })
        .collect();

    let mut cuttable: Vec<CutCandidate> = dists
        .iter()
        .filter(|(category, _)| is_discretionary(category))
        .map(|(category, d)| CutCandidate {
            category: category.clone(),
            monthly_avg: round_to(d.mean, 2),
            potential_savings: round_to(d.mean, 2),
        })
        .collect();
    cuttable.sort_by(|a, b| {
        b.monthly_avg
            .total_cmp(&a.monthly_avg)
            .then_with(|| a.category.cmp(&b.category))
    });
    cuttable.truncate(config.categories_to_cut);

    let essential: f64 = dists
        .iter()
        .filter(|(category, _)| is_essential(category))
        .map(|(_, d)| d.mean)
        .sum();
    let total_mean: f64 = dists.values().map(|d| d.mean).sum();
    let cut_total: f64 = cuttable.iter().map(|c| c.monthly_avg).sum();

    let p50 = round_to(stats::quantile(&runways, 0.5), 1);
    Ok(Some(StressTest {
        scenario: "job_loss",
        months_of_runway: p50,
        runway_ci: RunwayInterval {
            p10: round_to(stats::quantile(&runways, 0.1), 1),
            p50,
            p90: round_to(stats::quantile(&runways, 0.9), 1),
        },
        estimated_savings: round_to(savings, 2),
        minimum_monthly_budget: round_to(essential, 2),
        categories_to_cut: cuttable,
        revised_monthly_budget: round_to((total_mean - cut_total).max(0.0), 2),
        simulations: config.simulations,
    }))
}

/// What-if scenario for a forward projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scenario {
    Baseline,
    JobLoss,
    ExpenseIncrease { category: String, multiplier: f64 },
    SubscriptionPurge,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectedMonth {
    pub month: usize,
    pub spend_p10: f64,
    pub spend_p50: f64,
    pub spend_p90: f64,
    pub net_p50: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectionBaseline {
    pub monthly_income: f64,
    pub monthly_spending: f64,
    pub fixed_costs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub scenario: Scenario,
    pub months: usize,
    pub monthly: Vec<ProjectedMonth>,
    pub baseline: ProjectionBaseline,
}

/// Project monthly spend forward under a scenario
pub fn project(
    ledger: &Ledger,
    months: usize,
    scenario: Scenario,
    config: &ResilienceConfig,
) -> Result<Projection> {
    let base = distributions(ledger, config);
    if base.is_empty() {
        return Err(Error::InvalidData("Not enough spending data to project".into()));
    }

    let mut income_by_month: BTreeMap<_, f64> = BTreeMap::new();
    for t in ledger.income() {
        *income_by_month.entry(t.month()).or_insert(0.0) += t.amount.abs();
    }
    let monthly_income = stats::mean(&income_by_month.values().copied().collect::<Vec<_>>());

    let mut dists = base.clone();
    let mut effective_income = monthly_income;
    match &scenario {
        Scenario::Baseline => {}
        Scenario::JobLoss => effective_income = 0.0,
        Scenario::ExpenseIncrease {
            category,
            multiplier,
        } => {
            if let Some((_, d)) = dists
                .iter_mut()
                .find(|(c, _)| c.eq_ignore_ascii_case(category))
            {
                d.mean *= multiplier;
            }
        }
        Scenario::SubscriptionPurge => {
            dists.retain(|c, _| !c.eq_ignore_ascii_case("subscriptions"));
        }
    }

    let paths = simulate(&dists, config.simulations, months, ledger.seed())?;
    let monthly = (0..months)
        .map(|m| {
            let column: Vec<f64> = paths.iter().map(|p| p[m]).collect();
            let nets: Vec<f64> = column.iter().map(|s| effective_income - s).collect();
            ProjectedMonth {
                month: m + 1,
                spend_p10: round_to(stats::quantile(&column, 0.1), 2),
                spend_p50: round_to(stats::quantile(&column, 0.5), 2),
                spend_p90: round_to(stats::quantile(&column, 0.9), 2),
                net_p50: round_to(stats::quantile(&nets, 0.5), 2),
            }
        })
        .collect();

    let all: Vec<f64> = paths.iter().flatten().copied().collect();
    let fixed_costs = base
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case("subscriptions"))
        .map(|(_, d)| d.mean)
        .unwrap_or(0.0);

    Ok(Projection {
        scenario,
        months,
        monthly,
        baseline: ProjectionBaseline {
            monthly_income: round_to(monthly_income, 2),
            monthly_spending: round_to(stats::mean(&all), 2),
            fixed_costs: round_to(fixed_costs, 2),
        },
    })
}
