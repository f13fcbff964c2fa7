use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DirectoryRepository, OrderRepository, SubscriptionRepository};
use crate::types::{
    Order, OrderStatus, OrderSummary, PaymentIntent, PaymentTransaction, Profile, Role, Service,
    Subscription,
};

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    services: HashMap<Uuid, Service>,
    orders: HashMap<Uuid, Order>,
    subscriptions: Vec<Subscription>,
    intents: HashMap<String, PaymentIntent>,
    transactions: Vec<PaymentTransaction>,
}

/// A thread-safe in-memory store implementing every repository port.
///
/// Cloning shares the underlying tables. Used by tests and local runs
/// without Postgres.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_profile(&self, profile: Profile) {
        self.tables.write().await.profiles.insert(profile.id, profile);
    }

    pub async fn put_service(&self, service: Service) {
        self.tables.write().await.services.insert(service.id, service);
    }

    pub async fn subscription_count(&self) -> usize {
        self.tables.read().await.subscriptions.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.tables.read().await.transactions.len()
    }

    pub async fn transactions(&self) -> Vec<PaymentTransaction> {
        self.tables.read().await.transactions.clone()
    }
}

#[async_trait]
impl DirectoryRepository for InMemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>> {
        Ok(self.tables.read().await.services.get(&service_id).cloned())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            bail!("order {} already exists", order.id);
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.orders.get_mut(&order_id) {
            Some(order) if order.status == expected => {
                order.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_orders(
        &self,
        user_id: Uuid,
        role: Role,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64)> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| is_party(o, user_id, role))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = orders.len() as i64;
        let page = orders
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn order_summary(&self, user_id: Uuid, role: Role) -> Result<OrderSummary> {
        let tables = self.tables.read().await;
        let mut summary = OrderSummary::default();
        for o in tables.orders.values().filter(|o| is_party(o, user_id, role)) {
            summary.total_orders += 1;
            match o.status {
                OrderStatus::Paid | OrderStatus::InProgress => summary.active_orders += 1,
                OrderStatus::Completed => {
                    summary.completed_orders += 1;
                    summary.completed_earnings += o.influencer_earning;
                }
                _ => {}
            }
            if o.status != OrderStatus::Cancelled {
                summary.gross_amount += o.amount;
            }
        }
        Ok(summary)
    }
}

fn is_party(order: &Order, user_id: Uuid, role: Role) -> bool {
    match role {
        Role::Brand => order.brand_id == user_id,
        Role::Influencer => order.influencer_id == user_id,
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.tables
            .write()
            .await
            .subscriptions
            .push(subscription.clone());
        Ok(())
    }

    async fn latest_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn get_subscription(&self, subscription_id: Uuid) -> Result<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.id == subscription_id)
            .cloned())
    }

    async fn insert_payment_intent(&self, intent: &PaymentIntent) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.intents.contains_key(&intent.gateway_order_id) {
            bail!(
                "payment intent for gateway order {} already exists",
                intent.gateway_order_id
            );
        }
        tables
            .intents
            .insert(intent.gateway_order_id.clone(), intent.clone());
        Ok(())
    }

    async fn get_payment_intent(&self, gateway_order_id: &str) -> Result<Option<PaymentIntent>> {
        Ok(self
            .tables
            .read()
            .await
            .intents
            .get(gateway_order_id)
            .cloned())
    }

    async fn find_transaction_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .find(|t| t.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn activate_paid_subscription(
        &self,
        subscription: &Subscription,
        transaction: &PaymentTransaction,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .transactions
            .iter()
            .any(|t| t.gateway_order_id == transaction.gateway_order_id)
        {
            return Ok(false);
        }
        tables.subscriptions.push(subscription.clone());
        tables.transactions.push(transaction.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlanType, SubscriptionStatus, TransactionStatus};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn order(brand_id: Uuid, influencer_id: Uuid, minutes_ago: i64) -> Order {
        Order {
            id: Uuid::new_v4(),
            brand_id,
            influencer_id,
            service_id: Uuid::new_v4(),
            amount: dec!(100),
            platform_fee: dec!(10),
            influencer_earning: dec!(90),
            status: OrderStatus::Paid,
            requirements: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_conditional_status_update() {
        let store = InMemoryStore::new();
        let o = order(Uuid::new_v4(), Uuid::new_v4(), 0);
        store.insert_order(&o).await.unwrap();

        let stale = store
            .update_order_status(o.id, OrderStatus::Delivered, OrderStatus::Completed)
            .await
            .unwrap();
        assert!(!stale);

        let applied = store
            .update_order_status(o.id, OrderStatus::Paid, OrderStatus::InProgress)
            .await
            .unwrap();
        assert!(applied);
        let stored = store.get_order(o.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::InProgress);
    }

    #[tokio::test]
    async fn test_list_orders_by_party_newest_first() {
        let store = InMemoryStore::new();
        let brand = Uuid::new_v4();
        let influencer = Uuid::new_v4();
        let old = order(brand, influencer, 30);
        let new = order(brand, influencer, 1);
        let other = order(Uuid::new_v4(), Uuid::new_v4(), 0);
        for o in [&old, &new, &other] {
            store.insert_order(o).await.unwrap();
        }

        let (page, total) = store.list_orders(brand, Role::Brand, 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page[0].id, new.id);
        assert_eq!(page[1].id, old.id);

        let (page, total) = store
            .list_orders(influencer, Role::Influencer, 1, 1)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, old.id);

        let (page, _) = store.list_orders(brand, Role::Influencer, 10, 0).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_order_summary_per_party() {
        let store = InMemoryStore::new();
        let brand = Uuid::new_v4();
        let influencer = Uuid::new_v4();
        let statuses = [
            OrderStatus::Paid,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ];
        for status in statuses {
            let mut o = order(brand, influencer, 0);
            o.status = status;
            store.insert_order(&o).await.unwrap();
        }
        store
            .insert_order(&order(Uuid::new_v4(), influencer, 0))
            .await
            .unwrap();

        let s = store.order_summary(brand, Role::Brand).await.unwrap();
        assert_eq!(s.total_orders, 5);
        assert_eq!(s.active_orders, 2);
        assert_eq!(s.completed_orders, 2);
        assert_eq!(s.gross_amount, dec!(400));
        assert_eq!(s.completed_earnings, dec!(180));

        let s = store.order_summary(influencer, Role::Influencer).await.unwrap();
        assert_eq!(s.total_orders, 6);
        assert_eq!(s.active_orders, 3);
        assert_eq!(s.completed_earnings, dec!(180));

        let empty = store.order_summary(influencer, Role::Brand).await.unwrap();
        assert_eq!(empty, OrderSummary::default());
    }

    #[tokio::test]
    async fn test_duplicate_payment_intent_is_rejected() {
        let store = InMemoryStore::new();
        let intent = PaymentIntent {
            gateway_order_id: "order_1".into(),
            user_id: Uuid::new_v4(),
            plan_type: PlanType::Brand,
            amount: dec!(299),
            currency: "INR".into(),
            created_at: Utc::now(),
        };
        store.insert_payment_intent(&intent).await.unwrap();

        let mut other = intent.clone();
        other.user_id = Uuid::new_v4();
        assert!(store.insert_payment_intent(&other).await.is_err());
        let stored = store.get_payment_intent("order_1").await.unwrap().unwrap();
        assert_eq!(stored.user_id, intent.user_id);
    }

    #[tokio::test]
    async fn test_settling_twice_writes_once() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id: user,
            plan_type: PlanType::Brand,
            status: SubscriptionStatus::Active,
            amount: dec!(299),
            trial_ends_at: None,
            current_period_end: None,
            created_at: Utc::now(),
        };
        let tx = PaymentTransaction {
            id: Uuid::new_v4(),
            user_id: user,
            subscription_id: sub.id,
            kind: "subscription".into(),
            amount: dec!(299),
            status: TransactionStatus::Success,
            gateway_payment_id: "pay_1".into(),
            gateway_order_id: "order_1".into(),
            created_at: Utc::now(),
        };
        assert!(store.activate_paid_subscription(&sub, &tx).await.unwrap());

        let mut again = sub.clone();
        again.id = Uuid::new_v4();
        assert!(!store.activate_paid_subscription(&again, &tx).await.unwrap());
        assert_eq!(store.subscription_count().await, 1);
        assert_eq!(store.transaction_count().await, 1);
    }
}
