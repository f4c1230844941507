use crate::{print_info, print_success, SubscriptionCommands};
use colored::*;
use tic_core::Plan;
use tic_store::WalletStore;

pub fn handle(
    store: &WalletStore,
    action: SubscriptionCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SubscriptionCommands::Create {
            user,
            plan,
            start,
            end,
        } => {
            let plan = Plan::parse(&plan)?;
            let sub = store.create_subscription(&user, plan, start, end)?;
            print_success(&format!(
                "Subscription {} created: {} {} ({} .. {})",
                sub.id.to_string().cyan(),
                user,
                plan.as_str().bold(),
                start,
                end
            ));
            println!(
                "  daily allocation: {}",
                plan.daily_amount().to_string().green()
            );
        }
        SubscriptionCommands::Expire { today } => {
            let expired = store.expire_subscriptions(today)?;
            if expired == 0 {
                print_info("Nothing to expire");
            } else {
                print_success(&format!("Expired {} subscriptions", expired));
            }
        }
    }
    Ok(())
}
