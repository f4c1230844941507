// ─────────────────────────────────────────────────────────────────
// Daily distribution scheduler
// ─────────────────────────────────────────────────────────────────
// One unit of work per subscription active on the target date: append a
// DAILY_DISTRIBUTION credit to the owner's TIC bucket under the
// "{subscription_id}|{date}" key, then fan out commissions for entries that
// actually posted. Units run in bounded-parallel tokio tasks; a unit
// failure is logged and counted, never fatal to the batch.
// ─────────────────────────────────────────────────────────────────

use crate::commission::CommissionEngine;
use crate::BatchReport;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tic_core::{
    distribution_key, AppendOutcome, Bucket, EntryKind, NewEntry, Subscription, WalletError,
};
use tic_store::WalletStore;

const DEFAULT_CONCURRENCY: usize = 8;

/// Counters for one distribution run: the subscription units themselves and
/// the commission entries their postings fanned out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DistributionReport {
    pub distributions: BatchReport,
    pub commissions: BatchReport,
}

pub struct DistributionScheduler {
    store: WalletStore,
    concurrency: usize,
}

impl DistributionScheduler {
    pub fn new(store: WalletStore) -> Self {
        Self {
            store,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run the distribution for one calendar day. Safe to re-run for any
    /// past date: already-paid subscriptions collapse to Duplicate and are
    /// counted as skipped.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<DistributionReport, WalletError> {
        let subscriptions = self.store.active_subscriptions_on(date)?;
        tracing::info!(
            %date,
            subscriptions = subscriptions.len(),
            "starting daily distribution"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for sub in subscriptions {
            let store = self.store.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let sub_id = sub.id;
                (sub_id, distribute_one(&store, &sub, date))
            });
        }

        let mut report = DistributionReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (sub_id, result) = joined.map_err(|e| WalletError::Storage(e.to_string()))?;
            report.distributions.processed += 1;
            match result {
                Ok((outcome, fan_out)) => {
                    report.distributions.record(outcome);
                    report.commissions.absorb(fan_out);
                }
                Err(e) => {
                    tracing::warn!(subscription = sub_id, %date, error = %e, "distribution unit failed");
                    report.distributions.failed += 1;
                }
            }
        }

        tracing::info!(
            %date,
            distributions = %report.distributions,
            commissions = %report.commissions,
            "daily distribution finished"
        );
        Ok(report)
    }

    /// Flip subscriptions whose end_date has passed to EXPIRED.
    pub fn expire_subscriptions(&self, today: NaiveDate) -> Result<usize, WalletError> {
        let expired = self.store.expire_subscriptions(today)?;
        if expired > 0 {
            tracing::info!(%today, expired, "expired subscriptions");
        }
        Ok(expired)
    }
}

/// One subscription unit: append the day's credit and, if it posted for the
/// first time, fan out commissions. A Duplicate means a previous run already
/// did both.
fn distribute_one(
    store: &WalletStore,
    sub: &Subscription,
    date: NaiveDate,
) -> Result<(AppendOutcome, BatchReport), WalletError> {
    let outcome = store.append(
        NewEntry::new(
            &sub.user_email,
            Bucket::Tic,
            sub.plan.daily_amount(),
            EntryKind::DailyDistribution,
            distribution_key(sub.id, date),
        )
        .with_memo(format!("{} daily distribution for {}", sub.plan.as_str(), date)),
    )?;

    let fan_out = if outcome.is_new() {
        let entry = store
            .get_entry(outcome.entry_id())?
            .ok_or(WalletError::EntryNotFound(outcome.entry_id()))?;
        CommissionEngine::new(store.clone()).fan_out(&entry)?
    } else {
        BatchReport::default()
    };
    Ok((outcome, fan_out))
}
