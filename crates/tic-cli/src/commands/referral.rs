use crate::{print_success, ReferralCommands};
use colored::*;
use tic_store::WalletStore;

pub fn handle(
    store: &WalletStore,
    action: ReferralCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ReferralCommands::Link { referrer, referred } => {
            store.create_referral_edge(&referrer, &referred)?;
            print_success(&format!("{} linked under {}", referred.cyan(), referrer.cyan()));
        }
        ReferralCommands::Summary { user } => {
            let summary = store.referral_summary(&user)?;
            println!("{} {}", "User:".bold(), user.cyan());
            println!(
                "  {:<18} {}",
                "direct referrals:".bold(),
                summary.direct_referrals
            );
            println!(
                "  {:<18} {}",
                "team volume:".bold(),
                summary.team_volume.to_string().green()
            );
            let chain = store.ancestors(&user)?;
            if !chain.is_empty() {
                println!("  {:<18}", "upline:".bold());
                for edge in chain {
                    let marker = if edge.active { "•".green() } else { "○".dimmed() };
                    println!(
                        "    {} level {:<3} {}",
                        marker, edge.level_depth, edge.referrer_email
                    );
                }
            }
        }
    }
    Ok(())
}
