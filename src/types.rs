use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MarketError;

/// The side of the marketplace a profile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Influencer,
    Brand,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Influencer => "influencer",
            Role::Brand => "brand",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "influencer" => Ok(Role::Influencer),
            "brand" => Ok(Role::Brand),
            other => Err(anyhow::anyhow!("unknown role `{other}`")),
        }
    }
}

/// The authenticated caller, with the role resolved from its profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    /// Copied from the profile so plan recommendations need no second lookup.
    pub followers_count: Option<i64>,
}

/// A marketplace profile, reduced to what billing and orders need.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    /// The ID of the user owning the profile.
    pub id: Uuid,
    /// The profile role.
    pub role: Role,
    /// Self-reported follower count, influencers only.
    pub followers_count: Option<i64>,
}

/// A service package an influencer sells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    /// The ID of the service.
    pub id: Uuid,
    /// The influencer selling the service.
    pub influencer_id: Uuid,
    /// The service title.
    pub title: String,
    /// The listed price.
    pub price: Decimal,
    /// Whether the service can currently be ordered.
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    InProgress,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "in_progress" => Ok(OrderStatus::InProgress),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(anyhow::anyhow!("unknown order status `{other}`")),
        }
    }
}

/// A single purchase of a service by a brand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    /// The ID of the order.
    pub id: Uuid,
    /// The buying brand.
    pub brand_id: Uuid,
    /// The selling influencer.
    pub influencer_id: Uuid,
    /// The purchased service.
    pub service_id: Uuid,
    /// The price captured at creation.
    pub amount: Decimal,
    /// The platform's share of `amount`.
    pub platform_fee: Decimal,
    /// The influencer's share of `amount`.
    pub influencer_earning: Decimal,
    /// The lifecycle status.
    pub status: OrderStatus,
    /// Free-text brief from the brand.
    pub requirements: Option<String>,
    /// The timestamp when the order was created.
    pub created_at: DateTime<Utc>,
}

/// Order figures for one party, as shown on the dashboards.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OrderSummary {
    pub total_orders: i64,
    /// Orders in `paid` or `in_progress`.
    pub active_orders: i64,
    pub completed_orders: i64,
    /// Sum of `amount` over orders that were not cancelled. What a brand has spent.
    pub gross_amount: Decimal,
    /// Sum of `influencer_earning` over completed orders. What an influencer has earned.
    pub completed_earnings: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Free,
    CreatorPro,
    Brand,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "free",
            PlanType::CreatorPro => "creator_pro",
            PlanType::Brand => "brand",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan names are matched case-insensitively, so `Creator_Pro` resolves too.
impl FromStr for PlanType {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanType::Free),
            "creator_pro" => Ok(PlanType::CreatorPro),
            "brand" => Ok(PlanType::Brand),
            _ => Err(MarketError::UnknownPlan(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(anyhow::anyhow!("unknown subscription status `{other}`")),
        }
    }
}

/// A billing plan record. Rows are appended, never edited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub status: SubscriptionStatus,
    pub amount: Decimal,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A gateway order opened for a paid plan, awaiting checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntent {
    /// The order ID issued by the gateway.
    pub gateway_order_id: String,
    /// The paying user.
    pub user_id: Uuid,
    /// The plan being bought.
    pub plan_type: PlanType,
    /// The quoted price in whole currency units.
    pub amount: Decimal,
    /// The quoted currency.
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TransactionStatus::Success),
            other => Err(anyhow::anyhow!("unknown transaction status `{other}`")),
        }
    }
}

/// Audit record of a verified payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    /// Always `subscription` for now.
    pub kind: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub gateway_payment_id: String,
    pub gateway_order_id: String,
    pub created_at: DateTime<Utc>,
}
