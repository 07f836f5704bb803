//! Analysis command implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use spendlens_core::synthesis::money;
use spendlens_core::{gate, AnalysisConfig, AnalysisEngine, AnalysisRun, Profiler, ProgressEvent};

use super::{load_ledger, truncate};

pub async fn cmd_analyze(
    mut config: AnalysisConfig,
    file: &Path,
    json: bool,
    top: Option<usize>,
) -> Result<()> {
    if let Some(n) = top {
        if n == 0 {
            anyhow::bail!("--top must be at least 1");
        }
        config.synthesis.top_n = n;
    }

    let ledger = Arc::new(load_ledger(file)?);
    let engine = AnalysisEngine::new(config);
    let run = engine.analyze(ledger).await.context("Analysis failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    print_run(&run);
    Ok(())
}

fn print_run(run: &AnalysisRun) {
    let profile = &run.profile;

    println!();
    println!("🔍 Spendlens Analysis");
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {} transactions, {} to {} ({} months)",
        profile.transaction_count, profile.start_date, profile.end_date, profile.months_count
    );
    println!(
        "   Tools run: {}",
        run.tools_run
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for skipped in &run.tools_skipped {
        println!("   ⏭  {}: {}", skipped.name, skipped.reason);
    }

    println!();
    if run.insights.is_empty() {
        println!("   No insights for this ledger yet.");
    } else {
        println!("💡 Top Insights");
        for insight in &run.insights {
            let dollars = if insight.dollar_impact > 0.0 {
                format!("{}/yr", money(insight.dollar_impact))
            } else {
                "-".to_string()
            };
            println!(
                "   {:>2}. {:50} │ {:>10} │ {}",
                insight.rank,
                truncate(&insight.title, 50),
                dollars,
                insight.confidence
            );
            println!("       {}", insight.description);
            if let Some(action) = &insight.action_option {
                println!("       → {}", action);
            }
        }
        if run.all_insights.len() > run.insights.len() {
            println!(
                "   ({} more; use --json for everything)",
                run.all_insights.len() - run.insights.len()
            );
        }
    }

    if !run.savings_plan.opportunities.is_empty() {
        println!();
        println!(
            "💰 Savings options: {} a year",
            money(run.savings_plan.total_annual_savings)
        );
        for opportunity in &run.savings_plan.opportunities {
            println!(
                "   • {:50} {:>10}",
                truncate(&opportunity.title, 50),
                money(opportunity.annual_savings)
            );
        }
    }

    println!();
    println!("   Completed in {:.3}s", run.execution_time);
}

/// Print each progress event as one JSON line
pub async fn cmd_stream(config: AnalysisConfig, file: &Path) -> Result<()> {
    let ledger = Arc::new(load_ledger(file)?);
    let engine = AnalysisEngine::new(config);

    let profile = match engine.profile(&ledger) {
        Ok(profile) => profile,
        Err(e) => {
            println!("{}", ProgressEvent::error(e.to_string()).to_json()?);
            return Err(e).context("Profiling failed");
        }
    };

    let mut rx = engine.stream_analysis(ledger, profile);
    while let Some(event) = rx.recv().await {
        println!("{}", event.to_json()?);
        if event.is_terminal() {
            break;
        }
    }

    Ok(())
}

pub fn cmd_profile(config: &AnalysisConfig, file: &Path) -> Result<()> {
    let ledger = load_ledger(file)?;
    let profile = Profiler::with_config(config.gates.clone())
        .profile(&ledger)
        .context("Profiling failed")?;

    println!();
    println!("📊 Data Profile");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Transactions:   {}", profile.transaction_count);
    println!(
        "   Date range:     {} to {} ({} days, {} months)",
        profile.start_date, profile.end_date, profile.date_range_days, profile.months_count
    );
    println!("   Total spent:    {}", money(profile.total_spent));
    println!("   Monthly avg:    {}", money(profile.monthly_average));
    println!("   Recent 3 mo:    {}", money(profile.recent_3mo_avg));
    if profile.has_income {
        println!(
            "   Income:         {} / month ({} deposits)",
            money(profile.monthly_income),
            profile.income_deposit_count
        );
    } else {
        println!("   Income:         none detected");
    }
    if let Some(high) = &profile.highest_month {
        println!("   Highest month:  {} ({})", high.month.label(), money(high.total));
    }
    if let Some(low) = &profile.lowest_month {
        println!("   Lowest month:   {} ({})", low.month.label(), money(low.total));
    }

    println!();
    println!("   {:24} │ {:>10} │ {:>5} │ {:>6}", "Category", "Total", "Txns", "Share");
    for category in &profile.category_breakdown {
        println!(
            "   {:24} │ {:>10} │ {:>5} │ {:>5.1}%",
            truncate(&category.category, 24),
            money(category.total),
            category.transaction_count,
            category.share_pct
        );
    }

    Ok(())
}

pub fn cmd_gates(config: &AnalysisConfig, file: &Path) -> Result<()> {
    let ledger = load_ledger(file)?;
    let profile = Profiler::with_config(config.gates.clone())
        .profile(&ledger)
        .context("Profiling failed")?;

    println!();
    println!("🚦 Tool Eligibility");
    println!("   ─────────────────────────────────────────────────────────────");
    for decision in gate::evaluate(&profile, &config.gates) {
        if decision.eligible {
            println!("   ✅ {}", decision.tool_name);
        } else {
            println!(
                "   ⏭  {}: {}",
                decision.tool_name,
                decision.reason_if_skipped.as_deref().unwrap_or("not eligible")
            );
        }
        for check in &decision.sub_checks {
            match &check.reason {
                Some(reason) if !check.passed => println!("      ⏭  {}: {}", check.name, reason),
                _ => println!("      ✅ {}", check.name),
            }
        }
    }

    Ok(())
}
