// ─────────────────────────────────────────────────────────────────
// Rank qualification
// ─────────────────────────────────────────────────────────────────
// Monthly ladder over (direct referral count, team volume). Thresholds are
// monotonic; qualification checks Diamond first and falls through to
// Starter. Bonus is split 50/50 into TIC and GIC, at most once per
// (user, month).
// ─────────────────────────────────────────────────────────────────

use crate::WalletError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rank {
    Starter,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Rank {
    /// Descending order for threshold lookup (highest first).
    pub const DESCENDING: [Rank; 6] = [
        Rank::Diamond,
        Rank::Platinum,
        Rank::Gold,
        Rank::Silver,
        Rank::Bronze,
        Rank::Starter,
    ];

    /// Minimum active direct referrals for this rank.
    pub fn min_direct_referrals(&self) -> u32 {
        match self {
            Rank::Starter => 0,
            Rank::Bronze => 5,
            Rank::Silver => 10,
            Rank::Gold => 15,
            Rank::Platinum => 20,
            Rank::Diamond => 25,
        }
    }

    /// Minimum team volume (sum of downstream active subscription values).
    pub fn min_team_volume(&self) -> Decimal {
        match self {
            Rank::Starter => Decimal::ZERO,
            Rank::Bronze => Decimal::from(13_800),
            Rank::Silver => Decimal::from(41_400),
            Rank::Gold => Decimal::from(69_000),
            Rank::Platinum => Decimal::from(110_400),
            Rank::Diamond => Decimal::from(165_600),
        }
    }

    /// Monthly bonus for holding this rank. Zero for Starter.
    pub fn bonus_amount(&self) -> Decimal {
        match self {
            Rank::Starter => Decimal::ZERO,
            Rank::Bronze => Decimal::from(690),
            Rank::Silver => Decimal::from(2_484),
            Rank::Gold => Decimal::from(4_830),
            Rank::Platinum => Decimal::from(8_832),
            Rank::Diamond => Decimal::from(14_904),
        }
    }

    /// Highest rank whose thresholds are BOTH met.
    pub fn qualify(direct_referrals: u32, team_volume: Decimal) -> Rank {
        for rank in Rank::DESCENDING {
            if direct_referrals >= rank.min_direct_referrals()
                && team_volume >= rank.min_team_volume()
            {
                return rank;
            }
        }
        Rank::Starter
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Starter => "STARTER",
            Rank::Bronze => "BRONZE",
            Rank::Silver => "SILVER",
            Rank::Gold => "GOLD",
            Rank::Platinum => "PLATINUM",
            Rank::Diamond => "DIAMOND",
        }
    }

    pub fn parse(s: &str) -> Result<Rank, WalletError> {
        match s.to_ascii_uppercase().as_str() {
            "STARTER" => Ok(Rank::Starter),
            "BRONZE" => Ok(Rank::Bronze),
            "SILVER" => Ok(Rank::Silver),
            "GOLD" => Ok(Rank::Gold),
            "PLATINUM" => Ok(Rank::Platinum),
            "DIAMOND" => Ok(Rank::Diamond),
            other => Err(WalletError::InvalidRank(other.to_string())),
        }
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per (user, qualification month). `bonus_distributed` flips true
/// at most once: the flip is committed in the same transaction as the two
/// RANK_BONUS ledger entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RankQualification {
    pub user_email: String,
    /// First day of the month being evaluated.
    pub qualification_month: NaiveDate,
    pub rank: Rank,
    pub direct_referrals: u32,
    pub team_volume: Decimal,
    pub bonus_distributed: bool,
}

impl RankQualification {
    /// Storage key for the (user, month) uniqueness constraint.
    pub fn storage_key(user_email: &str, month: NaiveDate) -> String {
        format!("{}|{}", user_email, month.format("%Y-%m"))
    }
}

/// Normalize any date to the first of its month.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use rust_decimal_macros::dec;

    #[test]
    fn test_qualify_requires_both_thresholds() {
        // Referrals alone are not enough
        assert_eq!(Rank::qualify(25, Decimal::ZERO), Rank::Starter);
        // Volume alone is not enough
        assert_eq!(Rank::qualify(0, dec!(200000)), Rank::Starter);
        // Both met
        assert_eq!(Rank::qualify(25, dec!(165600)), Rank::Diamond);
        assert_eq!(Rank::qualify(5, dec!(13800)), Rank::Bronze);
    }

    #[test]
    fn test_qualify_falls_to_highest_met() {
        // Meets Gold's referrals but only Silver's volume → Silver
        assert_eq!(Rank::qualify(15, dec!(41400)), Rank::Silver);
        // Meets Diamond volume but only Platinum referrals → Platinum
        assert_eq!(Rank::qualify(20, dec!(165600)), Rank::Platinum);
    }

    #[test]
    fn test_thresholds_monotonic() {
        let ranks = [
            Rank::Starter,
            Rank::Bronze,
            Rank::Silver,
            Rank::Gold,
            Rank::Platinum,
            Rank::Diamond,
        ];
        for pair in ranks.windows(2) {
            assert!(pair[0].min_direct_referrals() < pair[1].min_direct_referrals());
            assert!(pair[0].min_team_volume() < pair[1].min_team_volume());
            assert!(pair[0].bonus_amount() < pair[1].bonus_amount());
        }
    }

    #[test]
    fn test_bonus_amounts() {
        assert_eq!(Rank::Starter.bonus_amount(), Decimal::ZERO);
        assert_eq!(Rank::Bronze.bonus_amount(), dec!(690));
        assert_eq!(Rank::Diamond.bonus_amount(), dec!(14904));
    }

    #[test]
    fn test_month_start() {
        let d = NaiveDate::from_ymd_opt(2026, 7, 19).unwrap();
        let m = month_start(d);
        assert_eq!(m.day(), 1);
        assert_eq!(m.month(), 7);
        assert_eq!(m.year(), 2026);
    }

    #[test]
    fn test_storage_key_is_month_granular() {
        let a = RankQualification::storage_key(
            "u@example.com",
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        );
        let b = RankQualification::storage_key(
            "u@example.com",
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
        );
        // Same month, any day: same key
        assert_eq!(a, b);
        assert_eq!(a, "u@example.com|2026-02");
    }
}
