use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{DirectoryRepository, OrderRepository, SubscriptionRepository};
use crate::types::{
    Order, OrderStatus, OrderSummary, PaymentIntent, PaymentTransaction, PlanType, Profile, Role,
    Service, Subscription,
};

/// Repository adapter over the Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    role: String,
    followers_count: Option<i64>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Profile {
            id: row.id,
            role: row.role.parse()?,
            followers_count: row.followers_count,
        })
    }
}

#[derive(FromRow)]
struct ServiceRow {
    id: Uuid,
    influencer_id: Uuid,
    title: String,
    price: Decimal,
    is_active: bool,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            influencer_id: row.influencer_id,
            title: row.title,
            price: row.price,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    brand_id: Uuid,
    influencer_id: Uuid,
    service_id: Uuid,
    amount: Decimal,
    platform_fee: Decimal,
    influencer_earning: Decimal,
    status: String,
    requirements: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = anyhow::Error;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            id: row.id,
            brand_id: row.brand_id,
            influencer_id: row.influencer_id,
            service_id: row.service_id,
            amount: row.amount,
            platform_fee: row.platform_fee,
            influencer_earning: row.influencer_earning,
            status: row.status.parse()?,
            requirements: row.requirements,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan_type: String,
    status: String,
    amount: Decimal,
    trial_ends_at: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = anyhow::Error;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            plan_type: parse_plan(&row.plan_type)?,
            status: row.status.parse()?,
            amount: row.amount,
            trial_ends_at: row.trial_ends_at,
            current_period_end: row.current_period_end,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentIntentRow {
    gateway_order_id: String,
    user_id: Uuid,
    plan_type: String,
    amount: Decimal,
    currency: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentIntentRow> for PaymentIntent {
    type Error = anyhow::Error;

    fn try_from(row: PaymentIntentRow) -> Result<Self> {
        Ok(PaymentIntent {
            gateway_order_id: row.gateway_order_id,
            user_id: row.user_id,
            plan_type: parse_plan(&row.plan_type)?,
            amount: row.amount,
            currency: row.currency,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentTransactionRow {
    id: Uuid,
    user_id: Uuid,
    subscription_id: Uuid,
    kind: String,
    amount: Decimal,
    status: String,
    gateway_payment_id: String,
    gateway_order_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentTransactionRow> for PaymentTransaction {
    type Error = anyhow::Error;

    fn try_from(row: PaymentTransactionRow) -> Result<Self> {
        Ok(PaymentTransaction {
            id: row.id,
            user_id: row.user_id,
            subscription_id: row.subscription_id,
            kind: row.kind,
            amount: row.amount,
            status: row.status.parse()?,
            gateway_payment_id: row.gateway_payment_id,
            gateway_order_id: row.gateway_order_id,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct OrderSummaryRow {
    total_orders: i64,
    active_orders: i64,
    completed_orders: i64,
    gross_amount: Decimal,
    completed_earnings: Decimal,
}

impl From<OrderSummaryRow> for OrderSummary {
    fn from(row: OrderSummaryRow) -> Self {
        OrderSummary {
            total_orders: row.total_orders,
            active_orders: row.active_orders,
            completed_orders: row.completed_orders,
            gross_amount: row.gross_amount,
            completed_earnings: row.completed_earnings,
        }
    }
}

fn parse_plan(raw: &str) -> Result<PlanType> {
    raw.parse::<PlanType>()
        .with_context(|| format!("stored plan type `{raw}` is not recognised"))
}

#[async_trait]
impl DirectoryRepository for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"SELECT id, role, followers_count FROM profiles WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Profile::try_from).transpose()
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"SELECT id, influencer_id, title, price, is_active FROM services WHERE id = $1"#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Service::from))
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO orders
               (id, brand_id, influencer_id, service_id, amount, platform_fee, influencer_earning, status, requirements, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(order.id)
        .bind(order.brand_id)
        .bind(order.influencer_id)
        .bind(order.service_id)
        .bind(order.amount)
        .bind(order.platform_fee)
        .bind(order.influencer_earning)
        .bind(order.status.as_str())
        .bind(&order.requirements)
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .context("insert order")?;
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"SELECT id, brand_id, influencer_id, service_id, amount, platform_fee,
                      influencer_earning, status, requirements, created_at
               FROM orders WHERE id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let res = sqlx::query(r#"UPDATE orders SET status = $1 WHERE id = $2 AND status = $3"#)
            .bind(next.as_str())
            .bind(order_id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .context("update order status")?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_orders(
        &self,
        user_id: Uuid,
        role: Role,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64)> {
        // Column names cannot be bound, so pick the statement by role.
        let (select, count) = match role {
            Role::Brand => (
                r#"SELECT id, brand_id, influencer_id, service_id, amount, platform_fee,
                          influencer_earning, status, requirements, created_at
                   FROM orders WHERE brand_id = $1
                   ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
                r#"SELECT COUNT(*) FROM orders WHERE brand_id = $1"#,
            ),
            Role::Influencer => (
                r#"SELECT id, brand_id, influencer_id, service_id, amount, platform_fee,
                          influencer_earning, status, requirements, created_at
                   FROM orders WHERE influencer_id = $1
                   ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
                r#"SELECT COUNT(*) FROM orders WHERE influencer_id = $1"#,
            ),
        };

        let rows = sqlx::query_as::<_, OrderRow>(select)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar(count)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((orders, total))
    }

    async fn order_summary(&self, user_id: Uuid, role: Role) -> Result<OrderSummary> {
        let party_column = match role {
            Role::Brand => "brand_id",
            Role::Influencer => "influencer_id",
        };
        let sql = format!(
            r#"SELECT COUNT(*) AS total_orders,
                      COUNT(*) FILTER (WHERE status IN ('paid', 'in_progress')) AS active_orders,
                      COUNT(*) FILTER (WHERE status = 'completed') AS completed_orders,
                      COALESCE(SUM(amount) FILTER (WHERE status <> 'cancelled'), 0) AS gross_amount,
                      COALESCE(SUM(influencer_earning) FILTER (WHERE status = 'completed'), 0) AS completed_earnings
               FROM orders WHERE {party_column} = $1"#
        );

        let row = sqlx::query_as::<_, OrderSummaryRow>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("summarise orders")?;
        Ok(row.into())
    }
}

#[async_trait]
impl SubscriptionRepository for PgStore {
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        insert_subscription_with(&self.pool, subscription).await
    }

    async fn latest_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"SELECT id, user_id, plan_type, status, amount, trial_ends_at, current_period_end, created_at
               FROM subscriptions WHERE user_id = $1
               ORDER BY created_at DESC LIMIT 1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn get_subscription(&self, subscription_id: Uuid) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"SELECT id, user_id, plan_type, status, amount, trial_ends_at, current_period_end, created_at
               FROM subscriptions WHERE id = $1"#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn insert_payment_intent(&self, intent: &PaymentIntent) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO payment_intents (gateway_order_id, user_id, plan_type, amount, currency, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&intent.gateway_order_id)
        .bind(intent.user_id)
        .bind(intent.plan_type.as_str())
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(intent.created_at)
        .execute(&self.pool)
        .await
        .context("insert payment intent")?;
        Ok(())
    }

    async fn get_payment_intent(&self, gateway_order_id: &str) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntentRow>(
            r#"SELECT gateway_order_id, user_id, plan_type, amount, currency, created_at
               FROM payment_intents WHERE gateway_order_id = $1"#,
        )
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentIntent::try_from).transpose()
    }

    async fn find_transaction_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, PaymentTransactionRow>(
            r#"SELECT id, user_id, subscription_id, kind, amount, status,
                      gateway_payment_id, gateway_order_id, created_at
               FROM payment_transactions WHERE gateway_order_id = $1"#,
        )
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn activate_paid_subscription(
        &self,
        subscription: &Subscription,
        transaction: &PaymentTransaction,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        insert_subscription_with(tx.as_mut(), subscription).await?;

        let res = sqlx::query(
            r#"INSERT INTO payment_transactions
               (id, user_id, subscription_id, kind, amount, status, gateway_payment_id, gateway_order_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (gateway_order_id) DO NOTHING"#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.subscription_id)
        .bind(&transaction.kind)
        .bind(transaction.amount)
        .bind(transaction.status.as_str())
        .bind(&transaction.gateway_payment_id)
        .bind(&transaction.gateway_order_id)
        .bind(transaction.created_at)
        .execute(tx.as_mut())
        .await
        .context("insert payment transaction")?;

        // Another request settled this gateway order first; drop our subscription row.
        if res.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }
}

async fn insert_subscription_with<'e, E>(executor: E, subscription: &Subscription) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"INSERT INTO subscriptions
           (id, user_id, plan_type, status, amount, trial_ends_at, current_period_end, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(subscription.id)
    .bind(subscription.user_id)
    .bind(subscription.plan_type.as_str())
    .bind(subscription.status.as_str())
    .bind(subscription.amount)
    .bind(subscription.trial_ends_at)
    .bind(subscription.current_period_end)
    .bind(subscription.created_at)
    .execute(executor)
    .await
    .context("insert subscription")?;
    Ok(())
}
