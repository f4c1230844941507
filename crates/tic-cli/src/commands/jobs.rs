use crate::{print_info, print_success, RankCommands};
use chrono::NaiveDate;
use colored::*;
use tic_jobs::{CommissionEngine, DistributionScheduler, RankEngine, RepairJob};
use tic_store::WalletStore;

pub async fn distribute(
    store: &WalletStore,
    date: NaiveDate,
    concurrency: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    print_info(&format!("Running daily distribution for {}...", date));
    let scheduler = DistributionScheduler::new(store.clone()).with_concurrency(concurrency);
    let report = scheduler.run_for_date(date).await?;

    println!();
    println!("{} {}", "Distributions:".bold(), report.distributions);
    println!("{} {}", "Commissions:  ".bold(), report.commissions);
    if report.distributions.failed > 0 || report.commissions.failed > 0 {
        println!(
            "{}",
            "Some units failed: re-run for the same date to retry them.".yellow()
        );
    } else {
        print_success("Distribution complete");
    }
    Ok(())
}

pub fn rank(store: &WalletStore, action: RankCommands) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RankEngine::new(store.clone());
    match action {
        RankCommands::Qualify { month } => {
            print_info(&format!("Qualifying ranks for {}...", month.format("%Y-%m")));
            let report = engine.qualify_month(month)?;
            println!("{} {}", "Qualification:".bold(), report);
            print_success("Qualification complete");
        }
        RankCommands::Distribute { month } => {
            print_info(&format!(
                "Paying rank bonuses for {}...",
                month.format("%Y-%m")
            ));
            let report = engine.distribute_month(month)?;
            println!("{} {}", "Bonuses:".bold(), report);
            print_success("Bonus distribution complete");
        }
    }
    Ok(())
}

pub fn repair(
    store: &WalletStore,
    from: NaiveDate,
    to: NaiveDate,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    print_info(&format!("Scanning distributions {} .. {}...", from, to));
    let job = RepairJob::new(store.clone());
    let anomalies = job.scan(from, to)?;

    if anomalies.is_empty() {
        print_success("No anomalies found");
        return Ok(());
    }
    println!();
    for anomaly in &anomalies {
        println!("  {} {:?}", "•".yellow(), anomaly);
    }
    println!(
        "{} {}",
        anomalies.len().to_string().yellow().bold(),
        "anomalies found"
    );

    if dry_run {
        print_info("Dry run: nothing repaired");
        return Ok(());
    }
    let report = job.repair(&anomalies)?;
    println!("{} {}", "Repair:".bold(), report);
    print_success("Repair complete");
    Ok(())
}

pub fn replay(store: &WalletStore, date: NaiveDate) -> Result<(), Box<dyn std::error::Error>> {
    print_info(&format!("Replaying commission fan-out for {}...", date));
    let report = CommissionEngine::new(store.clone()).replay(date)?;
    println!("{} {}", "Commissions:".bold(), report);
    print_success("Replay complete");
    Ok(())
}
