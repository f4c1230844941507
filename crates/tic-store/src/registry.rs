// ─────────────────────────────────────────────────────────────────
// Registries: subscriptions, referral graph, rank qualifications
// ─────────────────────────────────────────────────────────────────
// The referral graph is stored as its transitive closure: one row per
// (ancestor, descendant) pair with the precomputed depth, so the upward
// fan-out walk is a single prefix scan. The forest invariant (at most one
// direct referrer, no cycles) is enforced at edge creation.
// ─────────────────────────────────────────────────────────────────

use crate::{id_key, store_err, WalletStore};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::collections::BTreeSet;
use tic_core::{
    rank_bonus_key, referral::MAX_FANOUT_DEPTH, Bucket, EntryKind, LedgerEntry, Plan,
    RankQualification, ReferralEdge, Subscription, SubscriptionStatus, WalletError,
};

/// Referral metrics for one user, as consumed by the rank engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferralSummary {
    pub user_email: String,
    pub direct_referrals: u32,
    pub team_volume: Decimal,
}

/// edges_up key: referred \0 depth(BE u16). In a forest there is exactly
/// one ancestor per depth, so the pair is unique.
fn up_key(referred: &str, depth: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(referred.len() + 3);
    key.extend_from_slice(referred.as_bytes());
    key.push(0);
    key.extend_from_slice(&(depth as u16).to_be_bytes());
    key
}

/// edges_down key: referrer \0 referred.
fn down_key(referrer: &str, referred: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(referrer.len() + referred.len() + 1);
    key.extend_from_slice(referrer.as_bytes());
    key.push(0);
    key.extend_from_slice(referred.as_bytes());
    key
}

fn email_prefix(email: &str) -> Vec<u8> {
    let mut p = Vec::with_capacity(email.len() + 1);
    p.extend_from_slice(email.as_bytes());
    p.push(0);
    p
}

fn subs_by_email_key(email: &str, id: u64) -> Vec<u8> {
    let mut key = email_prefix(email);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

enum BonusAbort {
    AlreadyDistributed,
    Corrupt,
}

impl WalletStore {
    // ─────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────

    /// Register a purchased plan. Invoked after payment confirmation.
    pub fn create_subscription(
        &self,
        user_email: &str,
        plan: Plan,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Subscription, WalletError> {
        let sub = Subscription {
            id: self.generate_id()?,
            user_email: user_email.to_string(),
            plan,
            status: SubscriptionStatus::Active,
            start_date,
            end_date,
        };
        let json = serde_json::to_vec(&sub).map_err(store_err)?;
        self.subscriptions
            .insert(id_key(sub.id), json)
            .map_err(store_err)?;
        self.subs_by_email
            .insert(subs_by_email_key(user_email, sub.id), &[] as &[u8])
            .map_err(store_err)?;
        Ok(sub)
    }

    pub fn get_subscription(&self, id: u64) -> Result<Option<Subscription>, WalletError> {
        match self.subscriptions.get(id_key(id)).map_err(store_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    pub fn subscriptions_for(&self, email: &str) -> Result<Vec<Subscription>, WalletError> {
        let prefix = email_prefix(email);
        let mut out = Vec::new();
        for item in self.subs_by_email.scan_prefix(&prefix) {
            let (key, _) = item.map_err(store_err)?;
            let id = u64::from_be_bytes(
                key[key.len() - 8..]
                    .try_into()
                    .map_err(|_| WalletError::Storage("malformed subscription index".into()))?,
            );
            if let Some(sub) = self.get_subscription(id)? {
                out.push(sub);
            }
        }
        Ok(out)
    }

    /// Every subscription that earns a distribution on `date`.
    pub fn active_subscriptions_on(&self, date: NaiveDate) -> Result<Vec<Subscription>, WalletError> {
        let mut out = Vec::new();
        for item in self.subscriptions.iter() {
            let (_, bytes) = item.map_err(store_err)?;
            let sub: Subscription = serde_json::from_slice(&bytes).map_err(store_err)?;
            if sub.is_active_on(date) {
                out.push(sub);
            }
        }
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    /// Transition ACTIVE subscriptions with a passed end_date to EXPIRED.
    /// Returns how many were flipped. Re-running is a no-op.
    pub fn expire_subscriptions(&self, today: NaiveDate) -> Result<usize, WalletError> {
        let mut expired = 0;
        for item in self.subscriptions.iter() {
            let (key, bytes) = item.map_err(store_err)?;
            let mut sub: Subscription = serde_json::from_slice(&bytes).map_err(store_err)?;
            if sub.status == SubscriptionStatus::Active && sub.end_date < today {
                sub.status = SubscriptionStatus::Expired;
                let json = serde_json::to_vec(&sub).map_err(store_err)?;
                self.subscriptions.insert(key, json).map_err(store_err)?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// A user's current plan tier: VIP if any active VIP subscription,
    /// STARTER if only starter subscriptions are active, None otherwise.
    /// Determines commission depth eligibility.
    pub fn plan_tier(&self, email: &str) -> Result<Option<Plan>, WalletError> {
        let mut tier = None;
        for sub in self.subscriptions_for(email)? {
            if sub.status != SubscriptionStatus::Active {
                continue;
            }
            match sub.plan {
                Plan::Vip => return Ok(Some(Plan::Vip)),
                Plan::Starter => tier = Some(Plan::Starter),
            }
        }
        Ok(tier)
    }

    // ─────────────────────────────────────────────────────────────
    // Referral graph
    // ─────────────────────────────────────────────────────────────

    /// Create the direct edge referrer → referred and all implied ancestor
    /// rows up to depth 15, atomically. Refuses second referrers,
    /// self-referrals, and cycles.
    pub fn create_referral_edge(&self, referrer: &str, referred: &str) -> Result<(), WalletError> {
        if referrer == referred {
            return Err(WalletError::ReferralCycle {
                referrer: referrer.to_string(),
                referred: referred.to_string(),
            });
        }
        if self
            .edges_up
            .get(up_key(referred, 1))
            .map_err(store_err)?
            .is_some()
        {
            return Err(WalletError::ReferrerExists {
                referred: referred.to_string(),
            });
        }
        // Cycle check: referred must not already be an ancestor of referrer
        for edge in self.ancestors(referrer)? {
            if edge.referrer_email == referred {
                return Err(WalletError::ReferralCycle {
                    referrer: referrer.to_string(),
                    referred: referred.to_string(),
                });
            }
        }

        // Closure rows: the direct edge plus one row per ancestor of the
        // referrer, shifted one level deeper.
        let mut rows = vec![ReferralEdge {
            referrer_email: referrer.to_string(),
            referred_email: referred.to_string(),
            level_depth: 1,
            active: true,
        }];
        for ancestor in self.ancestors(referrer)? {
            let depth = ancestor.level_depth + 1;
            if depth > MAX_FANOUT_DEPTH {
                break;
            }
            rows.push(ReferralEdge {
                referrer_email: ancestor.referrer_email,
                referred_email: referred.to_string(),
                level_depth: depth,
                active: true,
            });
        }

        let mut serialized = Vec::with_capacity(rows.len());
        for row in &rows {
            serialized.push((
                up_key(&row.referred_email, row.level_depth),
                down_key(&row.referrer_email, &row.referred_email),
                serde_json::to_vec(row).map_err(store_err)?,
            ));
        }

        let direct_key = up_key(referred, 1);
        let result = (&self.edges_up, &self.edges_down).transaction(|(tx_up, tx_down)| {
            if tx_up.get(&direct_key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(()));
            }
            for (up, down, json) in &serialized {
                tx_up.insert(up.as_slice(), json.as_slice())?;
                tx_down.insert(down.as_slice(), json.as_slice())?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => Err(WalletError::ReferrerExists {
                referred: referred.to_string(),
            }),
            Err(TransactionError::Storage(e)) => Err(store_err(e)),
        }
    }

    /// All ancestors of `email`, nearest first (depth 1, 2, ...).
    pub fn ancestors(&self, email: &str) -> Result<Vec<ReferralEdge>, WalletError> {
        let prefix = email_prefix(email);
        let mut out = Vec::new();
        for item in self.edges_up.scan_prefix(&prefix) {
            let (_, bytes) = item.map_err(store_err)?;
            out.push(serde_json::from_slice(&bytes).map_err(store_err)?);
        }
        // Keys sort by depth already; keep the guarantee explicit
        out.sort_by_key(|e: &ReferralEdge| e.level_depth);
        Ok(out)
    }

    /// Activate or deactivate one (ancestor, descendant) row. Returns false
    /// if no such edge exists. Deactivation excludes the row from fan-out
    /// and metrics without touching the rest of the chain.
    pub fn set_edge_active(
        &self,
        referrer: &str,
        referred: &str,
        active: bool,
    ) -> Result<bool, WalletError> {
        let dkey = down_key(referrer, referred);
        let Some(bytes) = self.edges_down.get(&dkey).map_err(store_err)? else {
            return Ok(false);
        };
        let mut edge: ReferralEdge = serde_json::from_slice(&bytes).map_err(store_err)?;
        edge.active = active;
        let json = serde_json::to_vec(&edge).map_err(store_err)?;
        let ukey = up_key(referred, edge.level_depth);

        (&self.edges_up, &self.edges_down)
            .transaction(|(tx_up, tx_down)| {
                tx_up.insert(ukey.as_slice(), json.as_slice())?;
                tx_down.insert(dkey.as_slice(), json.as_slice())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| store_err(format!("{:?}", e)))?;
        Ok(true)
    }

    /// Count of active level-1 edges below `email`.
    pub fn direct_referral_count(&self, email: &str) -> Result<u32, WalletError> {
        let prefix = email_prefix(email);
        let mut count = 0;
        for item in self.edges_down.scan_prefix(&prefix) {
            let (_, bytes) = item.map_err(store_err)?;
            let edge: ReferralEdge = serde_json::from_slice(&bytes).map_err(store_err)?;
            if edge.level_depth == 1 && edge.active {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Team volume: sum of active subscription yearly values over every
    /// active downstream edge (all 15 levels).
    pub fn team_volume(&self, email: &str) -> Result<Decimal, WalletError> {
        let prefix = email_prefix(email);
        let mut volume = Decimal::ZERO;
        for item in self.edges_down.scan_prefix(&prefix) {
            let (_, bytes) = item.map_err(store_err)?;
            let edge: ReferralEdge = serde_json::from_slice(&bytes).map_err(store_err)?;
            if !edge.active {
                continue;
            }
            for sub in self.subscriptions_for(&edge.referred_email)? {
                if sub.status == SubscriptionStatus::Active {
                    volume += sub.plan.yearly_allocation();
                }
            }
        }
        Ok(volume)
    }

    pub fn referral_summary(&self, email: &str) -> Result<ReferralSummary, WalletError> {
        Ok(ReferralSummary {
            user_email: email.to_string(),
            direct_referrals: self.direct_referral_count(email)?,
            team_volume: self.team_volume(email)?,
        })
    }

    /// Distinct users holding at least one active direct referral: the
    /// rank engine's candidate set.
    pub fn users_with_direct_referrals(&self) -> Result<Vec<String>, WalletError> {
        let mut users = BTreeSet::new();
        for item in self.edges_down.iter() {
            let (_, bytes) = item.map_err(store_err)?;
            let edge: ReferralEdge = serde_json::from_slice(&bytes).map_err(store_err)?;
            if edge.level_depth == 1 && edge.active {
                users.insert(edge.referrer_email);
            }
        }
        Ok(users.into_iter().collect())
    }

    // ─────────────────────────────────────────────────────────────
    // Rank qualifications
    // ─────────────────────────────────────────────────────────────

    pub fn get_qualification(
        &self,
        email: &str,
        month: NaiveDate,
    ) -> Result<Option<RankQualification>, WalletError> {
        let key = RankQualification::storage_key(email, month);
        match self.ranks.get(key.as_bytes()).map_err(store_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    /// Write the month's qualification row. If a row already exists its
    /// `bonus_distributed` flag is preserved: re-qualifying never re-opens
    /// a paid month.
    pub fn upsert_qualification(
        &self,
        mut qualification: RankQualification,
    ) -> Result<RankQualification, WalletError> {
        let key = RankQualification::storage_key(
            &qualification.user_email,
            qualification.qualification_month,
        );
        if let Some(existing) =
            self.get_qualification(&qualification.user_email, qualification.qualification_month)?
        {
            qualification.bonus_distributed = existing.bonus_distributed;
        }
        let json = serde_json::to_vec(&qualification).map_err(store_err)?;
        self.ranks.insert(key.as_bytes(), json).map_err(store_err)?;
        Ok(qualification)
    }

    /// Qualification rows for `month` still owed a nonzero bonus.
    pub fn pending_bonuses(&self, month: NaiveDate) -> Result<Vec<RankQualification>, WalletError> {
        let month_suffix = format!("|{}", month.format("%Y-%m"));
        let mut out = Vec::new();
        for item in self.ranks.iter() {
            let (key, bytes) = item.map_err(store_err)?;
            let key_str = String::from_utf8_lossy(&key);
            if !key_str.ends_with(&month_suffix) {
                continue;
            }
            let row: RankQualification = serde_json::from_slice(&bytes).map_err(store_err)?;
            if !row.bonus_distributed && row.rank.bonus_amount() > Decimal::ZERO {
                out.push(row);
            }
        }
        out.sort_by(|a, b| a.user_email.cmp(&b.user_email));
        Ok(out)
    }

    /// Pay one user's monthly rank bonus: two RANK_BONUS entries (50% TIC,
    /// 50% GIC) and the `bonus_distributed` flip, committed as a single
    /// transaction. Returns the entry ids, or None if the month was already
    /// paid (or owes nothing): which makes concurrent and repeated calls
    /// collapse to exactly one payment.
    pub fn distribute_rank_bonus(
        &self,
        email: &str,
        month: NaiveDate,
    ) -> Result<Option<(u64, u64)>, WalletError> {
        let Some(row) = self.get_qualification(email, month)? else {
            return Ok(None);
        };
        if row.bonus_distributed {
            return Ok(None);
        }
        let bonus = row.rank.bonus_amount();
        if bonus == Decimal::ZERO {
            return Ok(None);
        }
        let half = bonus / Decimal::from(2);
        let created_at = Utc::now();
        let memo = format!("{} rank bonus for {}", row.rank, month.format("%Y-%m"));

        let mut paid_row = row.clone();
        paid_row.bonus_distributed = true;

        let tic_id = self.generate_id()?;
        let gic_id = self.generate_id()?;
        let halves = [
            (tic_id, Bucket::Tic),
            (gic_id, Bucket::Gic),
        ];
        let mut writes = Vec::with_capacity(2);
        for (id, bucket) in halves {
            let entry = LedgerEntry {
                id,
                wallet_owner: email.to_string(),
                bucket,
                amount: half,
                kind: EntryKind::RankBonus,
                idempotency_key: rank_bonus_key(email, month, bucket),
                created_at,
                related_entry_id: None,
                memo: memo.clone(),
            };
            writes.push((
                id_key(id),
                entry.idempotency_key.as_bytes().to_vec(),
                crate::owner_index_key(email, created_at.timestamp_millis(), id),
                serde_json::to_vec(&entry).map_err(store_err)?,
            ));
        }

        let rank_key = RankQualification::storage_key(email, month);
        let rank_json = serde_json::to_vec(&paid_row).map_err(store_err)?;

        let result = (
            &self.entries,
            &self.idempotency,
            &self.owner_index,
            &self.ranks,
        )
            .transaction(|(tx_entries, tx_idem, tx_index, tx_ranks)| {
                // Re-read the flag inside the transaction: the outer check
                // may have raced another distributor.
                let Some(bytes) = tx_ranks.get(rank_key.as_bytes())? else {
                    return Err(ConflictableTransactionError::Abort(
                        BonusAbort::AlreadyDistributed,
                    ));
                };
                let current: RankQualification = serde_json::from_slice(&bytes)
                    .map_err(|_| ConflictableTransactionError::Abort(BonusAbort::Corrupt))?;
                if current.bonus_distributed {
                    return Err(ConflictableTransactionError::Abort(
                        BonusAbort::AlreadyDistributed,
                    ));
                }
                for (entry_key, idem_key, index_key, json) in &writes {
                    if tx_idem.get(idem_key.as_slice())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(
                            BonusAbort::AlreadyDistributed,
                        ));
                    }
                    tx_idem.insert(idem_key.as_slice(), entry_key as &[u8])?;
                    tx_entries.insert(entry_key as &[u8], json.as_slice())?;
                    tx_index.insert(index_key.as_slice(), &[] as &[u8])?;
                }
                tx_ranks.insert(rank_key.as_bytes(), rank_json.as_slice())?;
                Ok(())
            });

        match result {
            Ok(()) => Ok(Some((tic_id, gic_id))),
            Err(TransactionError::Abort(BonusAbort::AlreadyDistributed)) => Ok(None),
            Err(TransactionError::Abort(BonusAbort::Corrupt)) => Err(WalletError::Storage(
                format!("corrupt rank qualification row for key '{}'", rank_key),
            )),
            Err(TransactionError::Storage(e)) => Err(store_err(e)),
        }
    }
}
