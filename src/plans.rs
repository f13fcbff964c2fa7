//! The static plan catalogue and the pure helpers built on it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::{PlanType, Role, SubscriptionStatus};

/// Followers at which an influencer is steered to the paid creator plan.
pub const CREATOR_PRO_FOLLOWER_THRESHOLD: i64 = 100_000;
/// Trial length applied when a free plan does not set its own.
pub const DEFAULT_TRIAL_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: PlanType,
    pub name: &'static str,
    /// Monthly price in whole currency units.
    pub price: Decimal,
    pub currency: &'static str,
    pub interval: &'static str,
    pub features: &'static [&'static str],
    /// Upper follower bound for the plan, if any.
    pub follower_limit: Option<i64>,
    pub trial_days: Option<i64>,
}

impl Plan {
    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }

    /// Price in the currency's smallest unit (paise for INR).
    pub fn price_minor_units(&self) -> i64 {
        (self.price * dec!(100)).trunc().to_i64().unwrap_or(0)
    }
}

pub static PLANS: [Plan; 3] = [
    Plan {
        id: PlanType::Free,
        name: "Nano/Micro",
        price: dec!(0),
        currency: "INR",
        interval: "month",
        features: &[
            "Up to 100K followers",
            "Create unlimited services",
            "Portfolio showcase",
            "Basic analytics",
        ],
        follower_limit: Some(CREATOR_PRO_FOLLOWER_THRESHOLD),
        trial_days: Some(DEFAULT_TRIAL_DAYS),
    },
    Plan {
        id: PlanType::CreatorPro,
        name: "Established Creator",
        price: dec!(199),
        currency: "INR",
        interval: "month",
        features: &[
            "100K+ followers",
            "Priority listing",
            "Advanced analytics",
            "Verified badge",
            "Priority support",
        ],
        follower_limit: None,
        trial_days: None,
    },
    Plan {
        id: PlanType::Brand,
        name: "Brand",
        price: dec!(299),
        currency: "INR",
        interval: "month",
        features: &[
            "Access all creators",
            "AI-powered matching",
            "Campaign management",
            "Analytics dashboard",
            "Dedicated support",
        ],
        follower_limit: None,
        trial_days: None,
    },
];

pub fn plan(plan_type: PlanType) -> &'static Plan {
    match plan_type {
        PlanType::Free => &PLANS[0],
        PlanType::CreatorPro => &PLANS[1],
        PlanType::Brand => &PLANS[2],
    }
}

/// Recommends a plan. Follower counts are self-reported, so this is only a default.
pub fn get_plan_for_user(role: Role, followers_count: i64) -> PlanType {
    match role {
        Role::Brand => PlanType::Brand,
        Role::Influencer if followers_count >= CREATOR_PRO_FOLLOWER_THRESHOLD => {
            PlanType::CreatorPro
        }
        Role::Influencer => PlanType::Free,
    }
}

pub fn can_access_feature(plan_type: PlanType, feature: &str) -> bool {
    plan(plan_type).features.contains(&feature)
}

pub fn is_subscription_active(
    status: SubscriptionStatus,
    current_period_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match status {
        SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => false,
        SubscriptionStatus::Trial | SubscriptionStatus::Active => {
            current_period_end.is_none_or(|end| end > now)
        }
    }
}
