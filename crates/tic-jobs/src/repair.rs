// ─────────────────────────────────────────────────────────────────
// Distribution repair job
// ─────────────────────────────────────────────────────────────────
// Finds two anomaly shapes in past DAILY_DISTRIBUTION entries: more than
// one live entry for the same (owner, day), and amounts above the sanity
// ceiling. Repair is compensation-only: offenders are voided and, where the
// day still deserves payment, one correct entry is reposted. Nothing is
// edited in place, so the audit trail keeps the mistake and its reversal.
// ─────────────────────────────────────────────────────────────────

use crate::BatchReport;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tic_core::{
    daily_sanity_ceiling, distribution_date, distribution_key, Bucket, EntryKind, LedgerEntry,
    NewEntry, WalletError,
};
use tic_store::WalletStore;

#[derive(Debug, Clone, PartialEq)]
pub enum Anomaly {
    /// More than one live distribution entry for one owner on one day.
    /// `entry_ids` is ascending; the first is kept, the rest voided.
    DuplicateDistribution {
        wallet_owner: String,
        day: NaiveDate,
        entry_ids: Vec<u64>,
    },
    /// A distribution amount above the per-day sanity ceiling.
    ExcessiveAmount {
        wallet_owner: String,
        day: NaiveDate,
        entry_id: u64,
        amount: Decimal,
    },
}

pub struct RepairJob {
    store: WalletStore,
}

impl RepairJob {
    pub fn new(store: WalletStore) -> Self {
        Self { store }
    }

    /// Scan distributions paying for days in `[from, to]` for anomalies.
    /// Entries already voided are invisible to the scan, so a finished
    /// repair leaves nothing to find.
    pub fn scan(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Anomaly>, WalletError> {
        let mut groups: BTreeMap<(String, NaiveDate), Vec<LedgerEntry>> = BTreeMap::new();
        for entry in self.store.scan_kind(EntryKind::DailyDistribution)? {
            if self.store.voided_by_id(entry.id)?.is_some() {
                continue;
            }
            // Group by the day the entry pays for, taken from its key. A
            // backfill posts past days with today's created_at, and a late
            // duplicate for day D must land in D's group no matter when it
            // was posted. Hand-posted entries without a date in the key
            // fall back to the posting day.
            let day = distribution_date(&entry.idempotency_key)
                .unwrap_or_else(|| entry.created_at.date_naive());
            if day < from || day > to {
                continue;
            }
            groups
                .entry((entry.wallet_owner.clone(), day))
                .or_default()
                .push(entry);
        }

        let ceiling = daily_sanity_ceiling();
        let mut anomalies = Vec::new();
        for ((owner, day), mut entries) in groups {
            entries.sort_by_key(|e| e.id);
            if entries.len() > 1 {
                anomalies.push(Anomaly::DuplicateDistribution {
                    wallet_owner: owner.clone(),
                    day,
                    entry_ids: entries.iter().map(|e| e.id).collect(),
                });
            }
            for entry in &entries {
                if entry.amount > ceiling {
                    anomalies.push(Anomaly::ExcessiveAmount {
                        wallet_owner: owner.clone(),
                        day,
                        entry_id: entry.id,
                        amount: entry.amount,
                    });
                }
            }
        }
        Ok(anomalies)
    }

    /// Compensate the given anomalies. `posted` counts VOID and repost
    /// entries written; an anomaly already handled by a previous run is
    /// counted as skipped.
    pub fn repair(&self, anomalies: &[Anomaly]) -> Result<BatchReport, WalletError> {
        let mut report = BatchReport::default();
        for anomaly in anomalies {
            report.processed += 1;
            let result = match anomaly {
                Anomaly::DuplicateDistribution {
                    wallet_owner,
                    day,
                    entry_ids,
                } => self.repair_duplicates(wallet_owner, *day, entry_ids, &mut report),
                Anomaly::ExcessiveAmount {
                    wallet_owner,
                    day,
                    entry_id,
                    ..
                } => self.repair_excessive(wallet_owner, *day, *entry_id, &mut report),
            };
            if let Err(e) = result {
                tracing::warn!(?anomaly, error = %e, "repair unit failed");
                report.failed += 1;
            }
        }
        tracing::info!(report = %report, "repair finished");
        Ok(report)
    }

    /// Keep the earliest entry, void the rest.
    fn repair_duplicates(
        &self,
        owner: &str,
        day: NaiveDate,
        entry_ids: &[u64],
        report: &mut BatchReport,
    ) -> Result<(), WalletError> {
        for &id in entry_ids.iter().skip(1) {
            match self
                .store
                .void_entry(id, "duplicate daily distribution")
            {
                Ok(void_id) => {
                    tracing::info!(%owner, %day, entry = id, void = void_id, "voided duplicate");
                    report.posted += 1;
                }
                Err(e) if e.is_already_done() => report.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Void the wrong amount and repost the correct daily amount if the
    /// owner held an active subscription that day.
    fn repair_excessive(
        &self,
        owner: &str,
        day: NaiveDate,
        entry_id: u64,
        report: &mut BatchReport,
    ) -> Result<(), WalletError> {
        match self.store.void_entry(entry_id, "amount above sanity ceiling") {
            Ok(_) => report.posted += 1,
            Err(e) if e.is_already_done() => {
                report.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let Some(sub) = self
            .store
            .subscriptions_for(owner)?
            .into_iter()
            .find(|s| s.is_active_on(day))
        else {
            tracing::info!(%owner, %day, "no active subscription, nothing reposted");
            return Ok(());
        };

        // Deterministic repost key: re-running after a crash between void
        // and repost converges on the same entry
        let outcome = self.store.append(
            NewEntry::new(
                owner,
                Bucket::Tic,
                sub.plan.daily_amount(),
                EntryKind::DailyDistribution,
                format!("{}|repost", distribution_key(sub.id, day)),
            )
            .with_related(entry_id)
            .with_memo(format!("repost after voiding entry {}", entry_id)),
        )?;
        report.record(outcome);
        Ok(())
    }
}
