use crate::{print_info, print_success};
use chrono::NaiveDate;
use colored::*;
use rust_decimal::Decimal;
use tic_core::Bucket;
use tic_store::{EntryFilter, WalletStore};

pub fn balance(store: &WalletStore, owner: &str) -> Result<(), Box<dyn std::error::Error>> {
    let balances = store.balances(owner)?;
    println!("{} {}", "Wallet:".bold(), owner.cyan());
    println!();
    for bucket in Bucket::ALL {
        let value = balances.get(bucket);
        let rendered = if value < Decimal::ZERO {
            value.to_string().red()
        } else {
            value.to_string().green()
        };
        println!("  {:<10} {}", bucket.as_str().bold(), rendered);
    }
    Ok(())
}

pub fn history(
    store: &WalletStore,
    owner: &str,
    bucket: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EntryFilter {
        bucket: bucket.map(Bucket::parse).transpose()?,
        from,
        to,
        ..Default::default()
    };
    let entries = store.query(owner, &filter)?;
    if entries.is_empty() {
        print_info("No entries");
        return Ok(());
    }
    for entry in &entries {
        let amount = if entry.amount < Decimal::ZERO {
            entry.amount.to_string().red()
        } else {
            format!("+{}", entry.amount).green()
        };
        let voided = match store.voided_by_id(entry.id)? {
            Some(void_id) => format!(" (voided by {})", void_id).yellow().to_string(),
            None => String::new(),
        };
        println!(
            "  #{:<6} {} {:<18} {:<8} {}{}  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.kind.as_str(),
            entry.bucket.as_str(),
            amount,
            voided,
            entry.memo.dimmed(),
        );
    }
    println!();
    println!("{} {}", entries.len().to_string().bold(), "entries");
    Ok(())
}

pub fn deposit(
    store: &WalletStore,
    owner: &str,
    bucket: &str,
    amount: Decimal,
    reference: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let bucket = Bucket::parse(bucket)?;
    let outcome = store.record_deposit(owner, bucket, amount, reference)?;
    report_outcome(outcome, "Deposited", amount, bucket);
    Ok(())
}

pub fn withdraw(
    store: &WalletStore,
    owner: &str,
    bucket: &str,
    amount: Decimal,
    reference: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let bucket = Bucket::parse(bucket)?;
    let outcome = store.record_withdrawal(owner, bucket, amount, reference)?;
    report_outcome(outcome, "Withdrew", amount, bucket);
    Ok(())
}

pub fn transfer(
    store: &WalletStore,
    from: &str,
    to: &str,
    bucket: &str,
    amount: Decimal,
    reference: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let bucket = Bucket::parse(bucket)?;
    let (out, _) = store.record_transfer(from, to, bucket, amount, reference)?;
    if out.is_new() {
        print_success(&format!(
            "Transferred {} {} from {} to {}",
            amount, bucket, from, to
        ));
    } else {
        print_info(&format!(
            "Reference already processed (entry {})",
            out.entry_id()
        ));
    }
    Ok(())
}

pub fn void(
    store: &WalletStore,
    entry_id: u64,
    reason: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let void_id = store.void_entry(entry_id, reason)?;
    print_success(&format!("Entry {} voided by entry {}", entry_id, void_id));
    Ok(())
}

fn report_outcome(outcome: tic_core::AppendOutcome, verb: &str, amount: Decimal, bucket: Bucket) {
    if outcome.is_new() {
        print_success(&format!(
            "{} {} {} (entry {})",
            verb,
            amount,
            bucket,
            outcome.entry_id()
        ));
    } else {
        print_info(&format!(
            "Reference already processed (entry {})",
            outcome.entry_id()
        ));
    }
}
