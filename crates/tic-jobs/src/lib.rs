// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TIC WALLET - BATCH JOBS
//
// The daily distribution scheduler, commission fan-out, monthly rank engine,
// and the repair job. Every job is kill-safe: all progress state lives in
// the ledger's idempotency keys, so a re-run after a crash resumes exactly
// where the previous run stopped.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod commission;
pub mod distribution;
pub mod rank;
pub mod repair;

pub use commission::CommissionEngine;
pub use distribution::{DistributionReport, DistributionScheduler};
pub use rank::RankEngine;
pub use repair::{Anomaly, RepairJob};

use tic_core::AppendOutcome;

/// Outcome counters for one batch run. `skipped` covers idempotent replays
/// and units excluded by eligibility rules; `failed` units were logged and
/// left for the next run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub posted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: AppendOutcome) {
        if outcome.is_new() {
            self.posted += 1;
        } else {
            self.skipped += 1;
        }
    }

    pub fn absorb(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.posted += other.posted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} posted, {} skipped, {} failed",
            self.processed, self.posted, self.skipped, self.failed
        )
    }
}
