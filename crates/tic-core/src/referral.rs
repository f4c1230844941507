// ─────────────────────────────────────────────────────────────────
// Referral graph and commission rate table
// ─────────────────────────────────────────────────────────────────
// Forest: each user has at most one direct referrer; level_depth for an
// ancestor N hops up is N. Commission is a FLAT percentage of the referred
// user's own daily distribution base at every level: it does not compound
// on amounts already paid to closer ancestors.
//
// Rates: level 1 → 10%, 2-6 → 5%, 7-10 → 2.5%, 11-15 → 1%.
// STARTER-tier referrers earn at level 1 only; VIP at all 15 levels.
// ─────────────────────────────────────────────────────────────────

use crate::Plan;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum fan-out depth for VIP-tier referrers.
pub const MAX_FANOUT_DEPTH: u32 = 15;

/// Directed edge in the referral forest (referrer → referred).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReferralEdge {
    pub referrer_email: String,
    pub referred_email: String,
    /// Hops between referrer and referred: 1 for a direct referral.
    pub level_depth: u32,
    /// Inactive edges earn no commission but do not break the upward walk -
    /// an inactive referrer never blocks their own upline.
    pub active: bool,
}

/// Commission rate for an ancestor `depth` hops above the distribution's
/// owner. Zero outside 1..=15.
pub fn commission_rate(depth: u32) -> Decimal {
    match depth {
        1 => Decimal::new(10, 2),        // 0.10
        2..=6 => Decimal::new(5, 2),     // 0.05
        7..=10 => Decimal::new(25, 3),   // 0.025
        11..=15 => Decimal::new(1, 2),   // 0.01
        _ => Decimal::ZERO,
    }
}

/// Deepest level at which a referrer with this plan tier may earn.
pub fn max_earning_depth(tier: Plan) -> u32 {
    match tier {
        Plan::Starter => 1,
        Plan::Vip => MAX_FANOUT_DEPTH,
    }
}

/// Whether a referrer of the given tier earns at `depth`.
pub fn earns_at_depth(tier: Plan, depth: u32) -> bool {
    depth >= 1 && depth <= max_earning_depth(tier) && commission_rate(depth) > Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_table() {
        assert_eq!(commission_rate(1), dec!(0.10));
        for d in 2..=6 {
            assert_eq!(commission_rate(d), dec!(0.05));
        }
        for d in 7..=10 {
            assert_eq!(commission_rate(d), dec!(0.025));
        }
        for d in 11..=15 {
            assert_eq!(commission_rate(d), dec!(0.01));
        }
        assert_eq!(commission_rate(0), Decimal::ZERO);
        assert_eq!(commission_rate(16), Decimal::ZERO);
    }

    #[test]
    fn test_starter_capped_at_level_one() {
        assert!(earns_at_depth(Plan::Starter, 1));
        assert!(!earns_at_depth(Plan::Starter, 2));
        assert!(!earns_at_depth(Plan::Starter, 3));
        assert!(!earns_at_depth(Plan::Starter, 15));
    }

    #[test]
    fn test_vip_earns_all_fifteen_levels() {
        for d in 1..=15 {
            assert!(earns_at_depth(Plan::Vip, d), "depth {}", d);
        }
        assert!(!earns_at_depth(Plan::Vip, 16));
        assert!(!earns_at_depth(Plan::Vip, 0));
    }

    #[test]
    fn test_full_chain_payout_fraction() {
        // 10% + 5×5% + 4×2.5% + 5×1% = 50% of the base per distribution
        let total: Decimal = (1..=15).map(commission_rate).sum();
        assert_eq!(total, dec!(0.50));
    }

    proptest! {
        #[test]
        fn prop_rates_never_negative_and_bounded(depth in 0u32..100) {
            let rate = commission_rate(depth);
            prop_assert!(rate >= Decimal::ZERO);
            prop_assert!(rate <= dec!(0.10));
        }

        #[test]
        fn prop_rates_monotonically_nonincreasing(depth in 1u32..15) {
            prop_assert!(commission_rate(depth) >= commission_rate(depth + 1));
        }
    }
}
