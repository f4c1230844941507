// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TIC WALLET - STORE MODULE
//
// sled-backed append-only ledger plus the subscription / referral / rank
// registries. The one strong-consistency primitive everything is built on:
// atomic insert-if-absent on the idempotency key, via a cross-tree sled
// transaction. Balances are derived by folding entries: there is no cached
// total anywhere in this store.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tic_core::{
    void_key, AppendOutcome, Bucket, EntryKind, LedgerEntry, NewEntry, WalletBalances, WalletError,
};

mod registry;

pub use registry::ReferralSummary;

const TREE_ENTRIES: &str = "entries";
const TREE_IDEMPOTENCY: &str = "idempotency";
const TREE_OWNER_INDEX: &str = "owner_index";
const TREE_VOIDED_BY: &str = "voided_by";
const TREE_SUBSCRIPTIONS: &str = "subscriptions";
const TREE_SUBS_BY_EMAIL: &str = "subs_by_email";
const TREE_EDGES_UP: &str = "referral_edges_up";
const TREE_EDGES_DOWN: &str = "referral_edges_down";
const TREE_RANKS: &str = "rank_qualifications";

/// Filter for ledger queries. All fields optional; `resume_after` restarts
/// an interrupted scan from the last entry seen.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub bucket: Option<Bucket>,
    pub kind: Option<EntryKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub resume_after: Option<EntryCursor>,
}

/// Position in an owner's entry sequence: (created_at, id) is a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryCursor {
    pub created_at_millis: i64,
    pub entry_id: u64,
}

impl EntryCursor {
    pub fn of(entry: &LedgerEntry) -> Self {
        Self {
            created_at_millis: entry.created_at.timestamp_millis(),
            entry_id: entry.id,
        }
    }
}

/// Ledger store and registries over a single sled database.
#[derive(Clone)]
pub struct WalletStore {
    db: Db,
    entries: Tree,
    idempotency: Tree,
    owner_index: Tree,
    voided_by: Tree,
    subscriptions: Tree,
    subs_by_email: Tree,
    edges_up: Tree,
    edges_down: Tree,
    ranks: Tree,
}

fn store_err(e: impl std::fmt::Display) -> WalletError {
    WalletError::Storage(e.to_string())
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn id_from_bytes(bytes: &[u8]) -> Result<u64, WalletError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| WalletError::Storage("malformed id bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

/// Owner index key: owner \0 created_at_millis(BE) id(BE).
/// Big-endian keeps sled's lexicographic order equal to chronological order.
fn owner_index_key(owner: &str, created_at_millis: i64, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner.len() + 17);
    key.extend_from_slice(owner.as_bytes());
    key.push(0);
    key.extend_from_slice(&(created_at_millis as u64).to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn owner_prefix(owner: &str) -> Vec<u8> {
    let mut p = Vec::with_capacity(owner.len() + 1);
    p.extend_from_slice(owner.as_bytes());
    p.push(0);
    p
}

impl WalletStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let db = sled::open(path).map_err(store_err)?;
        let open_tree = |name: &str| db.open_tree(name).map_err(store_err);
        Ok(Self {
            entries: open_tree(TREE_ENTRIES)?,
            idempotency: open_tree(TREE_IDEMPOTENCY)?,
            owner_index: open_tree(TREE_OWNER_INDEX)?,
            voided_by: open_tree(TREE_VOIDED_BY)?,
            subscriptions: open_tree(TREE_SUBSCRIPTIONS)?,
            subs_by_email: open_tree(TREE_SUBS_BY_EMAIL)?,
            edges_up: open_tree(TREE_EDGES_UP)?,
            edges_down: open_tree(TREE_EDGES_DOWN)?,
            ranks: open_tree(TREE_RANKS)?,
            db,
        })
    }

    /// Flush all pending writes to disk. Called on graceful shutdown.
    pub fn flush(&self) -> Result<(), WalletError> {
        self.db.flush().map_err(store_err)?;
        Ok(())
    }

    pub(crate) fn generate_id(&self) -> Result<u64, WalletError> {
        self.db.generate_id().map_err(store_err)
    }

    // ─────────────────────────────────────────────────────────────
    // Append / void
    // ─────────────────────────────────────────────────────────────

    /// Append an entry. If the idempotency key already exists, this is a
    /// no-op returning `Duplicate` with the existing entry id: never an
    /// error for the caller's workflow.
    ///
    /// Debit kinds (WITHDRAWAL, TRANSFER_OUT) are rejected with
    /// `InsufficientBalance` when the bucket cannot cover them.
    pub fn append(&self, new: NewEntry) -> Result<AppendOutcome, WalletError> {
        // Fast path: key already present, skip id allocation entirely
        if let Some(existing) = self.idempotency.get(new.idempotency_key.as_bytes()).map_err(store_err)? {
            return Ok(AppendOutcome::Duplicate(id_from_bytes(&existing)?));
        }

        if new.kind.is_debit() {
            // Advisory check: the fold runs outside the commit transaction
            // (sled transactional trees cannot be range-scanned), so two
            // racing debits with distinct keys can both pass it and overdraw
            // the bucket. The insert-if-absent on the idempotency key is the
            // only hard lock; an overdraft stays visible in the fold and is
            // reversible by VOID.
            let available = self.balance(&new.wallet_owner, new.bucket)?;
            // Debit amounts are stored negative
            if available + new.amount < Decimal::ZERO {
                return Err(WalletError::InsufficientBalance {
                    bucket: new.bucket,
                    available,
                    required: -new.amount,
                });
            }
        }

        let id = self.generate_id()?;
        let created_at = Utc::now();
        let entry = LedgerEntry {
            id,
            wallet_owner: new.wallet_owner,
            bucket: new.bucket,
            amount: new.amount,
            kind: new.kind,
            idempotency_key: new.idempotency_key,
            created_at,
            related_entry_id: new.related_entry_id,
            memo: new.memo,
        };
        self.commit_entry(&entry)
    }

    /// Single-entry commit: idempotency check + entry insert + owner index,
    /// all-or-nothing. Pre-serialized outside the transaction closure.
    fn commit_entry(&self, entry: &LedgerEntry) -> Result<AppendOutcome, WalletError> {
        let entry_json = serde_json::to_vec(entry).map_err(store_err)?;
        let idem_key = entry.idempotency_key.as_bytes().to_vec();
        let entry_key = id_key(entry.id);
        let index_key =
            owner_index_key(&entry.wallet_owner, entry.created_at.timestamp_millis(), entry.id);

        let result = (&self.entries, &self.idempotency, &self.owner_index).transaction(
            |(tx_entries, tx_idem, tx_index)| {
                if let Some(existing) = tx_idem.get(&idem_key)? {
                    let mut arr = [0u8; 8];
                    arr.copy_from_slice(&existing);
                    return Err(ConflictableTransactionError::Abort(u64::from_be_bytes(arr)));
                }
                tx_idem.insert(idem_key.as_slice(), &entry_key)?;
                tx_entries.insert(&entry_key, entry_json.as_slice())?;
                tx_index.insert(index_key.as_slice(), &[] as &[u8])?;
                Ok(())
            },
        );

        match result {
            Ok(()) => Ok(AppendOutcome::Posted(entry.id)),
            Err(TransactionError::Abort(existing_id)) => Ok(AppendOutcome::Duplicate(existing_id)),
            Err(TransactionError::Storage(e)) => Err(store_err(e)),
        }
    }

    /// Post a compensating VOID entry reversing `entry_id`.
    /// Fails with `AlreadyVoided` if a void already references the entry.
    pub fn void_entry(&self, entry_id: u64, reason: &str) -> Result<u64, WalletError> {
        let original = self
            .get_entry(entry_id)?
            .ok_or(WalletError::EntryNotFound(entry_id))?;

        if let Some(void_id) = self.voided_by_id(entry_id)? {
            return Err(WalletError::AlreadyVoided { entry_id, void_id });
        }

        let void_id = self.generate_id()?;
        let void_entry = LedgerEntry {
            id: void_id,
            wallet_owner: original.wallet_owner.clone(),
            bucket: original.bucket,
            amount: -original.amount,
            kind: EntryKind::Void,
            idempotency_key: void_key(entry_id),
            created_at: Utc::now(),
            related_entry_id: Some(entry_id),
            memo: reason.to_string(),
        };

        let entry_json = serde_json::to_vec(&void_entry).map_err(store_err)?;
        let idem_key = void_entry.idempotency_key.as_bytes().to_vec();
        let entry_key = id_key(void_id);
        let voided_key = id_key(entry_id);
        let index_key = owner_index_key(
            &void_entry.wallet_owner,
            void_entry.created_at.timestamp_millis(),
            void_id,
        );

        let result = (
            &self.entries,
            &self.idempotency,
            &self.owner_index,
            &self.voided_by,
        )
            .transaction(|(tx_entries, tx_idem, tx_index, tx_voided)| {
                if let Some(existing) = tx_voided.get(&voided_key)? {
                    let mut arr = [0u8; 8];
                    arr.copy_from_slice(&existing);
                    return Err(ConflictableTransactionError::Abort(u64::from_be_bytes(arr)));
                }
                tx_voided.insert(&voided_key, &entry_key)?;
                tx_idem.insert(idem_key.as_slice(), &entry_key)?;
                tx_entries.insert(&entry_key, entry_json.as_slice())?;
                tx_index.insert(index_key.as_slice(), &[] as &[u8])?;
                Ok(())
            });

        match result {
            Ok(()) => Ok(void_id),
            Err(TransactionError::Abort(existing_void)) => Err(WalletError::AlreadyVoided {
                entry_id,
                void_id: existing_void,
            }),
            Err(TransactionError::Storage(e)) => Err(store_err(e)),
        }
    }

    /// Id of the VOID entry reversing `entry_id`, if one exists.
    pub fn voided_by_id(&self, entry_id: u64) -> Result<Option<u64>, WalletError> {
        match self.voided_by.get(id_key(entry_id)).map_err(store_err)? {
            Some(bytes) => Ok(Some(id_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────

    pub fn get_entry(&self, id: u64) -> Result<Option<LedgerEntry>, WalletError> {
        match self.entries.get(id_key(id)).map_err(store_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    /// Id of the entry behind an idempotency key, if any.
    pub fn lookup_idempotency_key(&self, key: &str) -> Result<Option<u64>, WalletError> {
        match self.idempotency.get(key.as_bytes()).map_err(store_err)? {
            Some(bytes) => Ok(Some(id_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Ordered (created_at, id) scan of one owner's entries.
    pub fn query(&self, owner: &str, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, WalletError> {
        let prefix = owner_prefix(owner);
        let start: Vec<u8> = match filter.resume_after {
            Some(cursor) => {
                // First key strictly after the cursor position
                let mut k = owner_index_key(owner, cursor.created_at_millis, cursor.entry_id);
                k.push(0);
                k
            }
            None => prefix.clone(),
        };

        let mut out = Vec::new();
        for item in self.owner_index.range(start..) {
            let (key, _) = item.map_err(store_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Last 8 bytes of the index key are the entry id
            let id = id_from_bytes(&key[key.len() - 8..])?;
            let entry = self
                .get_entry(id)?
                .ok_or(WalletError::EntryNotFound(id))?;
            if self.matches(&entry, filter) {
                out.push(entry);
            }
        }
        Ok(out)
    }

    fn matches(&self, entry: &LedgerEntry, filter: &EntryFilter) -> bool {
        if let Some(bucket) = filter.bucket {
            if entry.bucket != bucket {
                return false;
            }
        }
        if let Some(kind) = filter.kind {
            if entry.kind != kind {
                return false;
            }
        }
        let date = entry.created_at.date_naive();
        if let Some(from) = filter.from {
            if date < from {
                return false;
            }
        }
        if let Some(to) = filter.to {
            if date > to {
                return false;
            }
        }
        true
    }

    /// Current balance of one bucket: the signed sum of its entries.
    /// Streams the ledger on every call: no cached counter exists to drift.
    pub fn balance(&self, owner: &str, bucket: Bucket) -> Result<Decimal, WalletError> {
        let filter = EntryFilter {
            bucket: Some(bucket),
            ..Default::default()
        };
        let mut total = Decimal::ZERO;
        for entry in self.query(owner, &filter)? {
            total += entry.amount;
        }
        Ok(total)
    }

    /// All five bucket balances in one scan.
    pub fn balances(&self, owner: &str) -> Result<WalletBalances, WalletError> {
        let mut balances = WalletBalances::default();
        for entry in self.query(owner, &EntryFilter::default())? {
            balances.credit(entry.bucket, entry.amount);
        }
        Ok(balances)
    }

    /// All entries of one kind across every owner, ordered by (created_at,
    /// id). Full tree scan: batch jobs only. Any date filtering is the
    /// caller's job, against the entry's natural period rather than
    /// `created_at` (a backfilled entry is posted today but pays for a past
    /// day).
    pub fn scan_kind(&self, kind: EntryKind) -> Result<Vec<LedgerEntry>, WalletError> {
        let mut out = Vec::new();
        for item in self.entries.iter() {
            let (_, bytes) = item.map_err(store_err)?;
            let entry: LedgerEntry = serde_json::from_slice(&bytes).map_err(store_err)?;
            if entry.kind == kind {
                out.push(entry);
            }
        }
        out.sort_by_key(|e| (e.created_at, e.id));
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────
    // Convenience appends for external money movement
    // ─────────────────────────────────────────────────────────────

    /// Deposit credited to a bucket. `external_ref` is the caller's payment
    /// transaction id; retries collapse onto one entry.
    pub fn record_deposit(
        &self,
        owner: &str,
        bucket: Bucket,
        amount: Decimal,
        external_ref: &str,
    ) -> Result<AppendOutcome, WalletError> {
        self.append(NewEntry::new(
            owner,
            bucket,
            amount,
            EntryKind::Deposit,
            tic_core::external_key(owner, EntryKind::Deposit, external_ref),
        ))
    }

    /// Withdrawal debited from a bucket (`amount` positive, stored negative).
    pub fn record_withdrawal(
        &self,
        owner: &str,
        bucket: Bucket,
        amount: Decimal,
        external_ref: &str,
    ) -> Result<AppendOutcome, WalletError> {
        self.append(NewEntry::new(
            owner,
            bucket,
            -amount,
            EntryKind::Withdrawal,
            tic_core::external_key(owner, EntryKind::Withdrawal, external_ref),
        ))
    }

    /// Transfer between two wallets: a TRANSFER_OUT debit and a TRANSFER_IN
    /// credit sharing the same external ref. The debit guard runs first, so
    /// a failed transfer posts nothing.
    pub fn record_transfer(
        &self,
        from_owner: &str,
        to_owner: &str,
        bucket: Bucket,
        amount: Decimal,
        external_ref: &str,
    ) -> Result<(AppendOutcome, AppendOutcome), WalletError> {
        let out = self.append(NewEntry::new(
            from_owner,
            bucket,
            -amount,
            EntryKind::TransferOut,
            tic_core::external_key(from_owner, EntryKind::TransferOut, external_ref),
        ))?;
        let inn = self.append(NewEntry::new(
            to_owner,
            bucket,
            amount,
            EntryKind::TransferIn,
            tic_core::external_key(to_owner, EntryKind::TransferIn, external_ref),
        ))?;
        Ok((out, inn))
    }
}
