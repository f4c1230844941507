// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TIC WALLET CLI - Operator Interface for Ledger & Batch Jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tic_store::WalletStore;

mod commands;

#[derive(Parser)]
#[command(name = "tic-cli")]
#[command(about = "TIC Wallet - Ledger, Distribution & Commission Management", long_about = None)]
#[command(version)]
struct Cli {
    /// Wallet database directory (default: ~/.tic-wallet)
    #[arg(short, long, env = "TIC_WALLET_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily token distribution for a date
    Distribute {
        /// Distribution date (YYYY-MM-DD)
        date: NaiveDate,

        /// Max subscriptions processed in parallel
        #[arg(short, long, default_value_t = 8)]
        concurrency: usize,
    },

    /// Monthly rank qualification and bonus payment
    Rank {
        #[command(subcommand)]
        action: RankCommands,
    },

    /// Scan a date range for distribution anomalies and compensate them
    Repair {
        /// Range start (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Range end (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Report anomalies without repairing
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-derive commission fan-out for a past date
    Replay {
        /// Distribution date (YYYY-MM-DD)
        date: NaiveDate,
    },

    /// Show all bucket balances for a wallet
    Balance {
        /// Wallet owner email
        owner: String,
    },

    /// List ledger entries for a wallet
    History {
        /// Wallet owner email
        owner: String,

        /// Only this bucket (MAIN, TIC, GIC, STAKING, PARTNER)
        #[arg(short, long)]
        bucket: Option<String>,

        /// From date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// To date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Subscription management
    Subscription {
        #[command(subcommand)]
        action: SubscriptionCommands,
    },

    /// Referral graph management
    Referral {
        #[command(subcommand)]
        action: ReferralCommands,
    },

    /// Credit a deposit to a wallet bucket
    Deposit {
        /// Wallet owner email
        #[arg(short, long)]
        owner: String,

        /// Bucket name
        #[arg(short, long, default_value = "MAIN")]
        bucket: String,

        /// Amount
        #[arg(short, long)]
        amount: Decimal,

        /// External payment reference (idempotency key)
        #[arg(short, long)]
        reference: String,
    },

    /// Debit a withdrawal from a wallet bucket
    Withdraw {
        /// Wallet owner email
        #[arg(short, long)]
        owner: String,

        /// Bucket name
        #[arg(short, long, default_value = "MAIN")]
        bucket: String,

        /// Amount
        #[arg(short, long)]
        amount: Decimal,

        /// External payment reference (idempotency key)
        #[arg(short, long)]
        reference: String,
    },

    /// Transfer between two wallets
    Transfer {
        /// Sender email
        #[arg(short, long)]
        from: String,

        /// Recipient email
        #[arg(short, long)]
        to: String,

        /// Bucket name
        #[arg(short, long, default_value = "MAIN")]
        bucket: String,

        /// Amount
        #[arg(short, long)]
        amount: Decimal,

        /// External reference (idempotency key)
        #[arg(short, long)]
        reference: String,
    },

    /// Void a ledger entry with a compensating reversal
    Void {
        /// Entry id to reverse
        entry_id: u64,

        /// Reason recorded on the VOID entry
        #[arg(short, long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum RankCommands {
    /// Compute qualification rows for a month
    Qualify {
        /// Any date inside the month (YYYY-MM-DD)
        month: NaiveDate,
    },

    /// Pay pending rank bonuses for a month
    Distribute {
        /// Any date inside the month (YYYY-MM-DD)
        month: NaiveDate,
    },
}

#[derive(Subcommand)]
enum SubscriptionCommands {
    /// Create an active subscription
    Create {
        /// User email
        #[arg(short, long)]
        user: String,

        /// Plan (STARTER or VIP)
        #[arg(short, long)]
        plan: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
    },

    /// Expire subscriptions whose end date has passed
    Expire {
        /// Reference date (YYYY-MM-DD)
        today: NaiveDate,
    },
}

#[derive(Subcommand)]
enum ReferralCommands {
    /// Link a referred user under a referrer
    Link {
        /// Referrer email
        #[arg(short, long)]
        referrer: String,

        /// Referred email
        #[arg(long)]
        referred: String,
    },

    /// Show direct referral count and team volume for a user
    Summary {
        /// User email
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    print_banner();

    let db_dir = cli.db.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tic-wallet")
    });
    std::fs::create_dir_all(&db_dir)?;
    let store = WalletStore::open(&db_dir)?;

    match cli.command {
        Commands::Distribute { date, concurrency } => {
            commands::jobs::distribute(&store, date, concurrency).await?;
        }
        Commands::Rank { action } => {
            commands::jobs::rank(&store, action)?;
        }
        Commands::Repair { from, to, dry_run } => {
            commands::jobs::repair(&store, from, to, dry_run)?;
        }
        Commands::Replay { date } => {
            commands::jobs::replay(&store, date)?;
        }
        Commands::Balance { owner } => {
            commands::wallet::balance(&store, &owner)?;
        }
        Commands::History {
            owner,
            bucket,
            from,
            to,
        } => {
            commands::wallet::history(&store, &owner, bucket.as_deref(), from, to)?;
        }
        Commands::Subscription { action } => {
            commands::subscription::handle(&store, action)?;
        }
        Commands::Referral { action } => {
            commands::referral::handle(&store, action)?;
        }
        Commands::Deposit {
            owner,
            bucket,
            amount,
            reference,
        } => {
            commands::wallet::deposit(&store, &owner, &bucket, amount, &reference)?;
        }
        Commands::Withdraw {
            owner,
            bucket,
            amount,
            reference,
        } => {
            commands::wallet::withdraw(&store, &owner, &bucket, amount, &reference)?;
        }
        Commands::Transfer {
            from,
            to,
            bucket,
            amount,
            reference,
        } => {
            commands::wallet::transfer(&store, &from, &to, &bucket, amount, &reference)?;
        }
        Commands::Void { entry_id, reason } => {
            commands::wallet::void(&store, entry_id, &reason)?;
        }
    }

    store.flush()?;
    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        "╔═══════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║        TIC WALLET - Operator CLI              ║".cyan().bold()
    );
    println!(
        "{}",
        "║   Ledger | Distribution | Commissions         ║".cyan()
    );
    println!(
        "{}",
        "╚═══════════════════════════════════════════════╝".cyan()
    );
    println!();
}

fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

#[allow(dead_code)]
fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

// ─────────────────────────────────────────────────────────────────
// UNIT TESTS
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    // ── CLI Argument Parsing ────────────────────────────────────

    #[test]
    fn test_cli_distribute() {
        let cli = Cli::try_parse_from(["tic-cli", "distribute", "2026-06-01"]);
        assert!(cli.is_ok(), "Failed to parse: {:?}", cli.err());
        match cli.unwrap().command {
            Commands::Distribute { date, concurrency } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
                assert_eq!(concurrency, 8);
            }
            _ => panic!("Expected Distribute"),
        }
    }

    #[test]
    fn test_cli_rank_qualify() {
        let cli = Cli::try_parse_from(["tic-cli", "rank", "qualify", "2026-02-01"]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Rank {
                action: RankCommands::Qualify { month },
            } => assert_eq!(month, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()),
            _ => panic!("Expected Rank::Qualify"),
        }
    }

    #[test]
    fn test_cli_repair_dry_run() {
        let cli = Cli::try_parse_from([
            "tic-cli",
            "repair",
            "--from",
            "2026-01-01",
            "--to",
            "2026-01-31",
            "--dry-run",
        ]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Repair { from, to, dry_run } => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
                assert_eq!(to, NaiveDate::from_ymd_opt(2026, 1, 31).unwrap());
                assert!(dry_run);
            }
            _ => panic!("Expected Repair"),
        }
    }

    #[test]
    fn test_cli_deposit() {
        let cli = Cli::try_parse_from([
            "tic-cli",
            "deposit",
            "--owner",
            "u@example.com",
            "--amount",
            "100.50",
            "--reference",
            "pay-123",
        ]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Deposit {
                owner,
                bucket,
                amount,
                reference,
            } => {
                assert_eq!(owner, "u@example.com");
                assert_eq!(bucket, "MAIN");
                assert_eq!(amount.to_string(), "100.50");
                assert_eq!(reference, "pay-123");
            }
            _ => panic!("Expected Deposit"),
        }
    }

    #[test]
    fn test_cli_subscription_create() {
        let cli = Cli::try_parse_from([
            "tic-cli",
            "subscription",
            "create",
            "--user",
            "u@example.com",
            "--plan",
            "VIP",
            "--start",
            "2026-01-01",
            "--end",
            "2026-12-31",
        ]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Subscription {
                action: SubscriptionCommands::Create { user, plan, .. },
            } => {
                assert_eq!(user, "u@example.com");
                assert_eq!(plan, "VIP");
            }
            _ => panic!("Expected Subscription::Create"),
        }
    }

    #[test]
    fn test_cli_referral_link() {
        let cli = Cli::try_parse_from([
            "tic-cli",
            "referral",
            "link",
            "--referrer",
            "a@example.com",
            "--referred",
            "b@example.com",
        ]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Referral {
                action: ReferralCommands::Link { referrer, referred },
            } => {
                assert_eq!(referrer, "a@example.com");
                assert_eq!(referred, "b@example.com");
            }
            _ => panic!("Expected Referral::Link"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        let cli = Cli::try_parse_from(["tic-cli", "distribute", "not-a-date"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_void() {
        let cli = Cli::try_parse_from(["tic-cli", "void", "42", "--reason", "operator reversal"]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Void { entry_id, reason } => {
                assert_eq!(entry_id, 42);
                assert_eq!(reason, "operator reversal");
            }
            _ => panic!("Expected Void"),
        }
    }
}
