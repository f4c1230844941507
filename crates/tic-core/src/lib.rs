// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TIC WALLET - CORE MODULE
//
// Ledger primitives: LedgerEntry, Bucket, EntryKind, and idempotency keys.
// Every balance is derived by folding the append-only entry log; entries are
// never updated or deleted, only reversed by a compensating VOID entry.
// All monetary arithmetic uses rust_decimal::Decimal (no floating point).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod plan;
pub mod rank;
pub mod referral;

pub use error::WalletError;
pub use plan::{Plan, Subscription, SubscriptionStatus};
pub use rank::{Rank, RankQualification};
pub use referral::ReferralEdge;

/// Days per subscription year. Daily distribution = yearly allocation / 365,
/// carried at full Decimal precision: pre-rounding here is what caused the
/// historical drift between paid and owed amounts.
pub const DAYS_PER_YEAR: u32 = 365;

/// Sanity ceiling for a single day's distribution, used by the repair scan.
/// The largest valid plan pays 6900/365 ≈ 18.904 per day, so anything above
/// this ceiling is structurally impossible and flags a duplicate or a
/// mis-computed amount.
pub fn daily_sanity_ceiling() -> Decimal {
    Decimal::from(50)
}

/// Named sub-balance within a wallet. Closed set: exhaustive matches only,
/// never string-typed currency branching.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bucket {
    Main,
    Tic,
    Gic,
    Staking,
    Partner,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Main,
        Bucket::Tic,
        Bucket::Gic,
        Bucket::Staking,
        Bucket::Partner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Main => "MAIN",
            Bucket::Tic => "TIC",
            Bucket::Gic => "GIC",
            Bucket::Staking => "STAKING",
            Bucket::Partner => "PARTNER",
        }
    }

    pub fn parse(s: &str) -> Result<Bucket, WalletError> {
        match s.to_ascii_uppercase().as_str() {
            "MAIN" => Ok(Bucket::Main),
            "TIC" => Ok(Bucket::Tic),
            "GIC" => Ok(Bucket::Gic),
            "STAKING" => Ok(Bucket::Staking),
            "PARTNER" => Ok(Bucket::Partner),
            other => Err(WalletError::InvalidBucket(other.to_string())),
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    DailyDistribution,
    Commission,
    RankBonus,
    Refund,
    Void,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "DEPOSIT",
            EntryKind::Withdrawal => "WITHDRAWAL",
            EntryKind::TransferIn => "TRANSFER_IN",
            EntryKind::TransferOut => "TRANSFER_OUT",
            EntryKind::DailyDistribution => "DAILY_DISTRIBUTION",
            EntryKind::Commission => "COMMISSION",
            EntryKind::RankBonus => "RANK_BONUS",
            EntryKind::Refund => "REFUND",
            EntryKind::Void => "VOID",
        }
    }

    /// Kinds that remove funds from a bucket. Their stored amounts are
    /// negative, and appends are guarded by an insufficient-balance check.
    pub fn is_debit(&self) -> bool {
        matches!(self, EntryKind::Withdrawal | EntryKind::TransferOut)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable, signed monetary record attributable to one wallet/bucket.
///
/// The set of entries for a wallet, summed per bucket, IS the bucket's
/// balance. A VOID entry carries `amount = -original.amount` and
/// `related_entry_id = Some(original.id)`, so the balance fold needs no
/// special-casing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: u64,
    pub wallet_owner: String,
    pub bucket: Bucket,
    pub amount: Decimal,
    pub kind: EntryKind,
    /// Deterministic string that makes re-submitting the same logical
    /// operation a no-op. Unique across the whole store.
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    /// For VOID entries: the entry this one reverses.
    pub related_entry_id: Option<u64>,
    pub memo: String,
}

/// An entry as submitted by a caller, before the store assigns id/timestamp.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub wallet_owner: String,
    pub bucket: Bucket,
    pub amount: Decimal,
    pub kind: EntryKind,
    pub idempotency_key: String,
    pub related_entry_id: Option<u64>,
    pub memo: String,
}

impl NewEntry {
    pub fn new(
        wallet_owner: impl Into<String>,
        bucket: Bucket,
        amount: Decimal,
        kind: EntryKind,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            wallet_owner: wallet_owner.into(),
            bucket,
            amount,
            kind,
            idempotency_key: idempotency_key.into(),
            related_entry_id: None,
            memo: String::new(),
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_related(mut self, entry_id: u64) -> Self {
        self.related_entry_id = Some(entry_id);
        self
    }
}

/// Result of appending an entry.
/// Distinguishes newly posted entries from idempotent replays.
/// Callers MUST check `is_new()` before triggering downstream side effects
/// (e.g. commission fan-out): a Duplicate already had its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Entry was new and committed to the ledger
    Posted(u64),
    /// The idempotency key already existed (no state change)
    Duplicate(u64),
}

impl AppendOutcome {
    /// Entry id regardless of whether the append was new or a replay
    pub fn entry_id(&self) -> u64 {
        match self {
            AppendOutcome::Posted(id) | AppendOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, AppendOutcome::Posted(_))
    }
}

/// Per-bucket balances for one wallet, as returned to dashboards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WalletBalances {
    pub main: Decimal,
    pub tic: Decimal,
    pub gic: Decimal,
    pub staking: Decimal,
    pub partner: Decimal,
}

impl WalletBalances {
    pub fn get(&self, bucket: Bucket) -> Decimal {
        match bucket {
            Bucket::Main => self.main,
            Bucket::Tic => self.tic,
            Bucket::Gic => self.gic,
            Bucket::Staking => self.staking,
            Bucket::Partner => self.partner,
        }
    }

    pub fn credit(&mut self, bucket: Bucket, amount: Decimal) {
        match bucket {
            Bucket::Main => self.main += amount,
            Bucket::Tic => self.tic += amount,
            Bucket::Gic => self.gic += amount,
            Bucket::Staking => self.staking += amount,
            Bucket::Partner => self.partner += amount,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Idempotency key construction
// ─────────────────────────────────────────────────────────────────
// One key per logical operation. The store enforces insert-if-absent on
// these, which is the single correctness-critical primitive: every batch
// job is re-runnable because its units collapse onto the same keys.
// ─────────────────────────────────────────────────────────────────

/// Key for one subscription-day of token distribution.
pub fn distribution_key(subscription_id: u64, date: NaiveDate) -> String {
    format!("{}|{}", subscription_id, date)
}

/// Day a distribution pays for, recovered from its idempotency key.
/// Accepts both the scheduler's `{subscription_id}|{date}` form and the
/// repair job's `...|repost` form. The posting timestamp is not usable for
/// this: a backfill run posts past days with today's `created_at`.
pub fn distribution_date(idempotency_key: &str) -> Option<NaiveDate> {
    idempotency_key.split('|').nth(1).and_then(|s| s.parse().ok())
}

/// Key tying one commission unit to exactly one source distribution and
/// one beneficiary.
pub fn commission_key(distribution_entry_id: u64, ancestor_email: &str) -> String {
    format!("{}|{}", distribution_entry_id, ancestor_email)
}

/// Key for one half of a monthly rank bonus. The bucket suffix keeps the
/// TIC and GIC halves from colliding under the store-wide uniqueness rule.
pub fn rank_bonus_key(user_email: &str, month: NaiveDate, bucket: Bucket) -> String {
    format!("{}|RANK_BONUS|{}|{}", user_email, month.format("%Y-%m"), bucket)
}

/// Key for externally-originated movements (deposits, withdrawals,
/// transfers). `external_ref` is the caller's transaction id: two retries
/// of the same payment collapse onto one entry.
pub fn external_key(owner: &str, kind: EntryKind, external_ref: &str) -> String {
    format!("{}|{}|{}", owner, kind, external_ref)
}

/// Key for a VOID entry reversing `entry_id`. At most one void per entry.
pub fn void_key(entry_id: u64) -> String {
    format!("VOID|{}", entry_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bucket_roundtrip_serde() {
        for bucket in Bucket::ALL {
            let json = serde_json::to_string(&bucket).unwrap();
            assert_eq!(json, format!("\"{}\"", bucket.as_str()));
            let back: Bucket = serde_json::from_str(&json).unwrap();
            assert_eq!(back, bucket);
        }
    }

    #[test]
    fn test_entry_kind_debits() {
        assert!(EntryKind::Withdrawal.is_debit());
        assert!(EntryKind::TransferOut.is_debit());
        assert!(!EntryKind::Deposit.is_debit());
        assert!(!EntryKind::DailyDistribution.is_debit());
        assert!(!EntryKind::Void.is_debit());
    }

    #[test]
    fn test_distribution_key_shape() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(distribution_key(42, date), "42|2026-03-14");
    }

    #[test]
    fn test_distribution_date_from_key() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(distribution_date(&distribution_key(42, date)), Some(date));
        assert_eq!(
            distribution_date(&format!("{}|repost", distribution_key(42, date))),
            Some(date)
        );
        // Keys that carry no date segment
        assert_eq!(distribution_date("a@b.c|DEPOSIT|tx-1"), None);
        assert_eq!(distribution_date("VOID|7"), None);
    }

    #[test]
    fn test_rank_bonus_keys_differ_per_bucket() {
        let month = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let tic = rank_bonus_key("a@b.c", month, Bucket::Tic);
        let gic = rank_bonus_key("a@b.c", month, Bucket::Gic);
        assert_ne!(tic, gic);
        assert_eq!(tic, "a@b.c|RANK_BONUS|2026-02|TIC");
    }

    #[test]
    fn test_append_outcome_accessors() {
        let posted = AppendOutcome::Posted(7);
        let dup = AppendOutcome::Duplicate(7);
        assert!(posted.is_new());
        assert!(!dup.is_new());
        assert_eq!(posted.entry_id(), dup.entry_id());
    }

    #[test]
    fn test_wallet_balances_credit() {
        let mut b = WalletBalances::default();
        b.credit(Bucket::Tic, dec!(18.9));
        b.credit(Bucket::Tic, dec!(-0.9));
        b.credit(Bucket::Partner, dec!(1.25));
        assert_eq!(b.get(Bucket::Tic), dec!(18.0));
        assert_eq!(b.get(Bucket::Partner), dec!(1.25));
        assert_eq!(b.get(Bucket::Main), Decimal::ZERO);
    }
}
