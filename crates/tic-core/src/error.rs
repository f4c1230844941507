// ─────────────────────────────────────────────────────────────────
// Error taxonomy
// ─────────────────────────────────────────────────────────────────
// DuplicateIdempotencyKey and AlreadyVoided are expected outcomes -
// batch jobs treat them as success-already-happened and keep going.
// Storage errors are the only variant that aborts a whole batch run;
// re-running the batch is always safe because of the idempotency keys.
// ─────────────────────────────────────────────────────────────────

use crate::Bucket;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    /// The operation already happened. Carries the existing entry id so the
    /// caller's workflow continues as if the append had succeeded.
    #[error("idempotency key '{key}' already exists as entry {existing_id}")]
    DuplicateIdempotencyKey { key: String, existing_id: u64 },

    #[error("insufficient balance in {bucket}: available {available}, required {required}")]
    InsufficientBalance {
        bucket: Bucket,
        available: Decimal,
        required: Decimal,
    },

    #[error("unknown plan id '{0}'")]
    InvalidPlan(String),

    #[error("unknown bucket '{0}'")]
    InvalidBucket(String),

    #[error("unknown rank '{0}'")]
    InvalidRank(String),

    /// Entry already has a compensating VOID. Repair jobs skip these.
    #[error("entry {entry_id} already voided by entry {void_id}")]
    AlreadyVoided { entry_id: u64, void_id: u64 },

    #[error("ledger entry {0} not found")]
    EntryNotFound(u64),

    #[error("subscription {0} not found")]
    SubscriptionNotFound(u64),

    #[error("referral edge {referrer} -> {referred} would create a cycle")]
    ReferralCycle { referrer: String, referred: String },

    #[error("{referred} already has a direct referrer")]
    ReferrerExists { referred: String },

    /// Storage-layer failure. Fatal for the current batch run; the run as a
    /// whole is retryable.
    #[error("storage error: {0}")]
    Storage(String),
}

impl WalletError {
    /// True for errors that mean "the work was already done" rather than
    /// "the work failed". Unit processors count these as skips, not errors.
    pub fn is_already_done(&self) -> bool {
        matches!(
            self,
            WalletError::DuplicateIdempotencyKey { .. } | WalletError::AlreadyVoided { .. }
        )
    }
}
