// ─────────────────────────────────────────────────────────────────
// Subscription plans
// ─────────────────────────────────────────────────────────────────
// STARTER: 500 TIC / year     VIP: 6900 TIC / year
// Daily amount = yearly / 365 at full Decimal precision. The division
// happens exactly once, at distribution time: never pre-rounded.
// ─────────────────────────────────────────────────────────────────

use crate::{WalletError, DAYS_PER_YEAR};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    Starter,
    Vip,
}

impl Plan {
    /// Yearly token allocation in TIC.
    pub fn yearly_allocation(&self) -> Decimal {
        match self {
            Plan::Starter => Decimal::from(500),
            Plan::Vip => Decimal::from(6900),
        }
    }

    /// Exact daily distribution amount (yearly / 365, full precision).
    /// VIP: 6900/365 = 18.904109589...  STARTER: 500/365 = 1.369863013...
    pub fn daily_amount(&self) -> Decimal {
        self.yearly_allocation() / Decimal::from(DAYS_PER_YEAR)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "STARTER",
            Plan::Vip => "VIP",
        }
    }

    pub fn parse(s: &str) -> Result<Plan, WalletError> {
        match s.to_ascii_uppercase().as_str() {
            "STARTER" => Ok(Plan::Starter),
            "VIP" => Ok(Plan::Vip),
            other => Err(WalletError::InvalidPlan(other.to_string())),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Expired,
}

/// One purchased plan. Created on payment confirmation, transitions
/// ACTIVE -> EXPIRED once end_date passes (batch job), never deleted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: u64,
    pub user_email: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Subscription {
    /// Whether this subscription earns a distribution on `date`.
    /// Status must be ACTIVE and the date inside [start_date, end_date].
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.status == SubscriptionStatus::Active
            && date >= self.start_date
            && date <= self.end_date
    }
}
