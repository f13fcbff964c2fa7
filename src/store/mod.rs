//! Repository ports used by the engines, with Postgres and in-memory adapters.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{
    Order, OrderStatus, OrderSummary, PaymentIntent, PaymentTransaction, Profile, Role, Service,
    Subscription,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>>;
    /// Sets `status = next` only while the row still holds `expected`.
    /// Returns whether a row was updated.
    async fn update_order_status(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool>;
    /// Orders where the user is the party matching `role`, newest first,
    /// along with the total count.
    async fn list_orders(
        &self,
        user_id: Uuid,
        role: Role,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64)>;
    /// Counts and money totals over the same orders `list_orders` returns.
    async fn order_summary(&self, user_id: Uuid, role: Role) -> Result<OrderSummary>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()>;
    async fn latest_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>>;
    async fn get_subscription(&self, subscription_id: Uuid) -> Result<Option<Subscription>>;
    async fn insert_payment_intent(&self, intent: &PaymentIntent) -> Result<()>;
    async fn get_payment_intent(&self, gateway_order_id: &str) -> Result<Option<PaymentIntent>>;
    async fn find_transaction_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentTransaction>>;
    /// Writes the subscription and its payment record together, or neither.
    /// Returns `false` when the gateway order was already settled, in which case
    /// nothing is written.
    async fn activate_paid_subscription(
        &self,
        subscription: &Subscription,
        transaction: &PaymentTransaction,
    ) -> Result<bool>;
}

pub type DirectoryRepositoryRef = Arc<dyn DirectoryRepository>;
pub type OrderRepositoryRef = Arc<dyn OrderRepository>;
pub type SubscriptionRepositoryRef = Arc<dyn SubscriptionRepository>;
