// ─────────────────────────────────────────────────────────────────
// Monthly rank engine
// ─────────────────────────────────────────────────────────────────
// Qualification and bonus payment are separate passes so either can be
// re-run alone. A month's bonus is permanent once paid: re-qualification
// never resets the distributed flag, and the payment itself is a single
// store transaction.
// ─────────────────────────────────────────────────────────────────

use crate::BatchReport;
use chrono::NaiveDate;
use tic_core::{rank::month_start, Rank, RankQualification, WalletError};
use tic_store::WalletStore;

pub struct RankEngine {
    store: WalletStore,
}

impl RankEngine {
    pub fn new(store: WalletStore) -> Self {
        Self { store }
    }

    /// Compute and upsert the month's qualification row for every user with
    /// at least one active direct referral.
    pub fn qualify_month(&self, month: NaiveDate) -> Result<BatchReport, WalletError> {
        let month = month_start(month);
        let mut report = BatchReport::default();
        for user in self.store.users_with_direct_referrals()? {
            report.processed += 1;
            match self.qualify_one(&user, month) {
                Ok(rank) => {
                    tracing::debug!(%user, %month, rank = rank.as_str(), "qualified");
                    report.posted += 1;
                }
                Err(e) => {
                    tracing::warn!(%user, %month, error = %e, "qualification failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(%month, report = %report, "rank qualification finished");
        Ok(report)
    }

    fn qualify_one(&self, user: &str, month: NaiveDate) -> Result<Rank, WalletError> {
        let summary = self.store.referral_summary(user)?;
        let rank = Rank::qualify(summary.direct_referrals, summary.team_volume);
        self.store.upsert_qualification(RankQualification {
            user_email: user.to_string(),
            qualification_month: month,
            rank,
            direct_referrals: summary.direct_referrals,
            team_volume: summary.team_volume,
            bonus_distributed: false,
        })?;
        Ok(rank)
    }

    /// Pay every qualification row of the month still owed a bonus. Rows
    /// another worker pays concurrently come back as skipped.
    pub fn distribute_month(&self, month: NaiveDate) -> Result<BatchReport, WalletError> {
        let month = month_start(month);
        let mut report = BatchReport::default();
        for row in self.store.pending_bonuses(month)? {
            report.processed += 1;
            match self
                .store
                .distribute_rank_bonus(&row.user_email, row.qualification_month)
            {
                Ok(Some(_)) => report.posted += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(user = %row.user_email, %month, error = %e, "bonus payment failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(%month, report = %report, "rank bonus distribution finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;
    use tic_core::{Bucket, Plan};

    fn open_store() -> (TempDir, WalletStore) {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// `leader` with `n` direct VIP referrals, each holding an active VIP
    /// subscription (6900 volume apiece).
    fn build_team(store: &WalletStore, leader: &str, n: usize) {
        for i in 0..n {
            let member = format!("m{}.{}", i, leader);
            store.create_referral_edge(leader, &member).unwrap();
            store
                .create_subscription(&member, Plan::Vip, ymd(2026, 1, 1), ymd(2026, 12, 31))
                .unwrap();
        }
    }

    #[test]
    fn test_qualify_assigns_highest_met_rank() {
        let (_dir, store) = open_store();
        // 5 directs, 5 * 6900 = 34500 volume: Bronze (Silver needs 10/41400)
        build_team(&store, "leader@x.c", 5);
        let engine = RankEngine::new(store.clone());
        let report = engine.qualify_month(ymd(2026, 2, 15)).unwrap();
        assert_eq!(report.posted, 1);

        let row = store
            .get_qualification("leader@x.c", ymd(2026, 2, 1))
            .unwrap()
            .unwrap();
        assert_eq!(row.rank, Rank::Bronze);
        assert_eq!(row.direct_referrals, 5);
        assert_eq!(row.team_volume, dec!(34500));
        assert!(!row.bonus_distributed);
    }

    #[test]
    fn test_both_thresholds_required() {
        let (_dir, store) = open_store();
        // 10 directs but only one holds a subscription: volume 6900 < 13800
        for i in 0..10 {
            store
                .create_referral_edge("leader@x.c", &format!("m{}@x.c", i))
                .unwrap();
        }
        store
            .create_subscription("m0@x.c", Plan::Vip, ymd(2026, 1, 1), ymd(2026, 12, 31))
            .unwrap();
        let engine = RankEngine::new(store.clone());
        engine.qualify_month(ymd(2026, 2, 1)).unwrap();
        let row = store
            .get_qualification("leader@x.c", ymd(2026, 2, 1))
            .unwrap()
            .unwrap();
        assert_eq!(row.rank, Rank::Starter);
    }

    #[test]
    fn test_distribute_month_pays_each_row_once() {
        let (_dir, store) = open_store();
        build_team(&store, "leader@x.c", 5);
        let engine = RankEngine::new(store.clone());
        engine.qualify_month(ymd(2026, 2, 1)).unwrap();

        let first = engine.distribute_month(ymd(2026, 2, 1)).unwrap();
        assert_eq!(first.posted, 1);
        // Bronze 690 split 50/50
        assert_eq!(store.balance("leader@x.c", Bucket::Tic).unwrap(), dec!(345));
        assert_eq!(store.balance("leader@x.c", Bucket::Gic).unwrap(), dec!(345));

        let second = engine.distribute_month(ymd(2026, 2, 1)).unwrap();
        assert_eq!(second.posted, 0);
        assert_eq!(second.processed, 0);
        assert_eq!(store.balance("leader@x.c", Bucket::Tic).unwrap(), dec!(345));
    }

    #[test]
    fn test_requalify_after_payment_keeps_flag() {
        let (_dir, store) = open_store();
        build_team(&store, "leader@x.c", 5);
        let engine = RankEngine::new(store.clone());
        engine.qualify_month(ymd(2026, 2, 1)).unwrap();
        engine.distribute_month(ymd(2026, 2, 1)).unwrap();

        // Team grows mid-month; re-running qualification must not re-open
        // the paid bonus
        build_team(&store, "other@x.c", 1);
        engine.qualify_month(ymd(2026, 2, 1)).unwrap();
        let row = store
            .get_qualification("leader@x.c", ymd(2026, 2, 1))
            .unwrap()
            .unwrap();
        assert!(row.bonus_distributed);
        assert_eq!(engine.distribute_month(ymd(2026, 2, 1)).unwrap().posted, 0);
    }

    #[test]
    fn test_months_are_independent() {
        let (_dir, store) = open_store();
        build_team(&store, "leader@x.c", 5);
        let engine = RankEngine::new(store.clone());
        engine.qualify_month(ymd(2026, 2, 1)).unwrap();
        engine.distribute_month(ymd(2026, 2, 1)).unwrap();
        engine.qualify_month(ymd(2026, 3, 1)).unwrap();
        engine.distribute_month(ymd(2026, 3, 1)).unwrap();
        assert_eq!(store.balance("leader@x.c", Bucket::Tic).unwrap(), dec!(690));
    }
}
