// ─────────────────────────────────────────────────────────────────
// Multi-level commission fan-out
// ─────────────────────────────────────────────────────────────────
// Commissions are flat: every depth earns its rate on the referred user's
// own daily base, never on a downstream commission. The
// "{distribution_entry_id}|{ancestor_email}" key makes the whole fan-out
// replayable entry by entry.
// ─────────────────────────────────────────────────────────────────

use crate::BatchReport;
use chrono::NaiveDate;
use tic_core::{
    commission_key, distribution_date,
    referral::{commission_rate, earns_at_depth},
    Bucket, EntryKind, LedgerEntry, NewEntry, WalletError,
};
use tic_store::WalletStore;

pub struct CommissionEngine {
    store: WalletStore,
}

impl CommissionEngine {
    pub fn new(store: WalletStore) -> Self {
        Self { store }
    }

    /// Pay every eligible ancestor of the distribution's owner. An inactive
    /// edge or an ineligible tier skips that ancestor without breaking the
    /// walk up the chain.
    pub fn fan_out(&self, distribution: &LedgerEntry) -> Result<BatchReport, WalletError> {
        let mut report = BatchReport::default();
        for edge in self.store.ancestors(&distribution.wallet_owner)? {
            report.processed += 1;
            if !edge.active {
                report.skipped += 1;
                continue;
            }
            let Some(tier) = self.store.plan_tier(&edge.referrer_email)? else {
                report.skipped += 1;
                continue;
            };
            if !earns_at_depth(tier, edge.level_depth) {
                report.skipped += 1;
                continue;
            }

            let rate = commission_rate(edge.level_depth);
            let amount = distribution.amount * rate;
            let result = self.store.append(
                NewEntry::new(
                    &edge.referrer_email,
                    Bucket::Partner,
                    amount,
                    EntryKind::Commission,
                    commission_key(distribution.id, &edge.referrer_email),
                )
                .with_related(distribution.id)
                .with_memo(format!(
                    "level {} commission on {}",
                    edge.level_depth, distribution.wallet_owner
                )),
            );
            match result {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::warn!(
                        ancestor = %edge.referrer_email,
                        depth = edge.level_depth,
                        distribution = distribution.id,
                        error = %e,
                        "commission unit failed"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Re-derive the fan-out for every non-voided distribution paying for
    /// `date`. Used after repairs; already-paid commissions replay as
    /// skipped duplicates. Matching goes by the day named in the entry's
    /// key, so backfilled distributions replay under their own day, not the
    /// day they were posted.
    pub fn replay(&self, date: NaiveDate) -> Result<BatchReport, WalletError> {
        let mut report = BatchReport::default();
        for entry in self.store.scan_kind(EntryKind::DailyDistribution)? {
            if self.store.voided_by_id(entry.id)?.is_some() {
                continue;
            }
            let day = distribution_date(&entry.idempotency_key)
                .unwrap_or_else(|| entry.created_at.date_naive());
            if day != date {
                continue;
            }
            report.absorb(self.fan_out(&entry)?);
        }
        tracing::info!(%date, report = %report, "commission replay finished");
        Ok(report)
    }
}
