//! Order lifecycle: fee split at creation and role-gated status transitions.

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::info;
use uuid::Uuid;

use crate::FEE_PERCENT;
use crate::error::{MarketError, Result};
use crate::store::{DirectoryRepositoryRef, OrderRepositoryRef};
use crate::types::{Actor, Order, OrderStatus, OrderSummary, Role};

/// Who may perform a given transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Only(Role),
    Either,
}

impl Party {
    fn admits(&self, role: Role) -> bool {
        match self {
            Party::Only(r) => *r == role,
            Party::Either => true,
        }
    }
}

/// Looks up the legal transition table. `None` means the move is never allowed.
pub fn transition_rule(from: OrderStatus, to: OrderStatus) -> Option<Party> {
    use OrderStatus::*;

    match (from, to) {
        (Paid, InProgress) => Some(Party::Only(Role::Influencer)),
        (InProgress, Delivered) => Some(Party::Only(Role::Influencer)),
        (Delivered, Completed) => Some(Party::Only(Role::Brand)),
        (Pending | Paid, Cancelled) => Some(Party::Either),
        _ => None,
    }
}

/// `round(amount * percent / 100)` to whole currency units, halves away from zero.
pub fn percent_of(amount: Decimal, percent: u32) -> Decimal {
    (amount * Decimal::from(percent) / Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Splits `amount` into `(platform_fee, influencer_earning)`; the parts always sum to `amount`.
pub fn split_fee(amount: Decimal) -> (Decimal, Decimal) {
    let platform_fee = percent_of(amount, FEE_PERCENT);
    (platform_fee, amount - platform_fee)
}

/// The request to place an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub influencer_id: Uuid,
    pub service_id: Uuid,
    pub requirements: Option<String>,
}

#[derive(Clone)]
pub struct OrderEngine {
    directory: DirectoryRepositoryRef,
    orders: OrderRepositoryRef,
}

impl OrderEngine {
    pub fn new(directory: DirectoryRepositoryRef, orders: OrderRepositoryRef) -> Self {
        Self { directory, orders }
    }

    /// Places an order for a service on behalf of a brand.
    ///
    /// The price is read from the service, split once, and the order is stored
    /// as `paid`. The split is never recomputed afterwards.
    pub async fn create_order(&self, actor: &Actor, req: NewOrder) -> Result<Order> {
        if actor.role != Role::Brand {
            return Err(MarketError::Unauthorized(
                "only brands can place orders".into(),
            ));
        }

        let service = self
            .directory
            .get_service(req.service_id)
            .await?
            .ok_or(MarketError::NotFound("service"))?;

        if !service.is_active {
            return Err(MarketError::ServiceInactive);
        }
        if service.influencer_id != req.influencer_id {
            return Err(MarketError::Unauthorized(
                "service does not belong to this influencer".into(),
            ));
        }
        if service.influencer_id == actor.user_id {
            return Err(MarketError::SelfDealing);
        }

        let amount = service.price;
        if amount <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount);
        }
        let (platform_fee, influencer_earning) = split_fee(amount);

        let order = Order {
            id: Uuid::new_v4(),
            brand_id: actor.user_id,
            influencer_id: service.influencer_id,
            service_id: service.id,
            amount,
            platform_fee,
            influencer_earning,
            status: OrderStatus::Paid,
            requirements: req.requirements.filter(|r| !r.trim().is_empty()),
            created_at: Utc::now(),
        };
        self.orders.insert_order(&order).await?;

        info!(
            order_id = %order.id,
            brand_id = %order.brand_id,
            influencer_id = %order.influencer_id,
            amount = %order.amount,
            platform_fee = %order.platform_fee,
            "order created"
        );
        Ok(order)
    }

    /// Moves an order to `next`, provided it is still in `expected`.
    pub async fn transition_status(
        &self,
        actor: &Actor,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order> {
        let mut order = self.get_order(actor, order_id).await?;

        if order.status != expected {
            return Err(MarketError::ConcurrentModification {
                expected,
                found: order.status,
            });
        }

        if order.status.is_terminal() {
            return Err(MarketError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }
        let party = transition_rule(order.status, next).ok_or(MarketError::InvalidTransition {
            from: order.status,
            to: next,
        })?;
        if !party.admits(actor.role) {
            return Err(MarketError::Unauthorized(format!(
                "a {} cannot move an order from `{}` to `{}`",
                actor.role, order.status, next
            )));
        }

        if !self
            .orders
            .update_order_status(order_id, expected, next)
            .await?
        {
            let found = self
                .orders
                .get_order(order_id)
                .await?
                .map(|o| o.status)
                .unwrap_or(expected);
            return Err(MarketError::ConcurrentModification { expected, found });
        }

        info!(
            order_id = %order_id,
            actor = %actor.user_id,
            from = %expected,
            to = %next,
            "order status changed"
        );
        order.status = next;
        Ok(order)
    }

    /// Fetches an order visible to the actor, i.e. one they are a party to.
    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(MarketError::NotFound("order"))?;

        let is_party = match actor.role {
            Role::Brand => order.brand_id == actor.user_id,
            Role::Influencer => order.influencer_id == actor.user_id,
        };
        if !is_party {
            return Err(MarketError::Unauthorized(
                "not a party to this order".into(),
            ));
        }
        Ok(order)
    }

    pub async fn list_orders(
        &self,
        actor: &Actor,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<Order>, i64)> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let offset = i64::from(page - 1) * i64::from(per_page);
        Ok(self
            .orders
            .list_orders(actor.user_id, actor.role, i64::from(per_page), offset)
            .await?)
    }

    /// Dashboard figures over every order the actor is a party to.
    pub async fn summary(&self, actor: &Actor) -> Result<OrderSummary> {
        Ok(self
            .orders
            .order_summary(actor.user_id, actor.role)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, OrderRepository};
    use crate::types::Service;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        engine: OrderEngine,
        store: InMemoryStore,
        brand: Actor,
        influencer: Actor,
        service_id: Uuid,
    }

    async fn fixture(price: Decimal) -> Fixture {
        let store = InMemoryStore::new();
        let brand = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Brand,
            followers_count: None,
        };
        let influencer = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Influencer,
            followers_count: Some(12_000),
        };
        let service_id = Uuid::new_v4();
        store
            .put_service(Service {
                id: service_id,
                influencer_id: influencer.user_id,
                title: "Sponsored reel".into(),
                price,
                is_active: true,
            })
            .await;

        let shared = Arc::new(store.clone());
        Fixture {
            engine: OrderEngine::new(shared.clone(), shared),
            store,
            brand,
            influencer,
            service_id,
        }
    }

    fn new_order(f: &Fixture) -> NewOrder {
        NewOrder {
            influencer_id: f.influencer.user_id,
            service_id: f.service_id,
            requirements: Some("Mention the launch date".into()),
        }
    }

    #[test]
    fn test_split_always_sums_to_amount() {
        for cents in [1_i64, 4, 5, 99, 1_005, 4_999, 12_345, 500_000, 999_999] {
            let amount = Decimal::new(cents, 2);
            let (fee, earning) = split_fee(amount);
            assert_eq!(fee + earning, amount, "amount {amount}");
            assert_eq!(
                fee,
                (amount * dec!(0.10)).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            );
        }
    }

    #[test]
    fn test_fee_rounds_half_up() {
        assert_eq!(split_fee(dec!(5)), (dec!(1), dec!(4)));
        assert_eq!(split_fee(dec!(14)), (dec!(1), dec!(13)));
        assert_eq!(split_fee(dec!(999.99)), (dec!(100), dec!(899.99)));
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        let all = [Pending, Paid, InProgress, Delivered, Completed, Cancelled];
        let legal = [
            (Paid, InProgress),
            (InProgress, Delivered),
            (Delivered, Completed),
            (Pending, Cancelled),
            (Paid, Cancelled),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    transition_rule(from, to).is_some(),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(all.iter().all(|to| transition_rule(terminal, *to).is_none()));
        }
    }

    #[tokio::test]
    async fn test_create_order_splits_fee() {
        let f = fixture(dec!(5000)).await;
        let order = assert_ok!(f.engine.create_order(&f.brand, new_order(&f)).await);

        assert_eq!(order.amount, dec!(5000));
        assert_eq!(order.platform_fee, dec!(500));
        assert_eq!(order.influencer_earning, dec!(4500));
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.brand_id, f.brand.user_id);
        assert_eq!(order.influencer_id, f.influencer.user_id);
        assert_eq!(f.store.get_order(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_create_order_rejects_influencer_actor() {
        let f = fixture(dec!(5000)).await;
        let err = assert_err!(f.engine.create_order(&f.influencer, new_order(&f)).await);
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_create_order_requires_active_matching_service() {
        let f = fixture(dec!(5000)).await;

        let mut missing = new_order(&f);
        missing.service_id = Uuid::new_v4();
        let err = assert_err!(f.engine.create_order(&f.brand, missing).await);
        assert!(matches!(err, MarketError::NotFound("service")));

        let mut wrong_seller = new_order(&f);
        wrong_seller.influencer_id = Uuid::new_v4();
        let err = assert_err!(f.engine.create_order(&f.brand, wrong_seller).await);
        assert!(matches!(err, MarketError::Unauthorized(_)));

        f.store
            .put_service(Service {
                id: f.service_id,
                influencer_id: f.influencer.user_id,
                title: "Paused".into(),
                price: dec!(5000),
                is_active: false,
            })
            .await;
        let err = assert_err!(f.engine.create_order(&f.brand, new_order(&f)).await);
        assert!(matches!(err, MarketError::ServiceInactive));
    }

    #[tokio::test]
    async fn test_create_order_rejects_free_service() {
        let f = fixture(dec!(0)).await;
        let err = assert_err!(f.engine.create_order(&f.brand, new_order(&f)).await);
        assert!(matches!(err, MarketError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_create_order_rejects_self_dealing() {
        let f = fixture(dec!(100)).await;
        let own = Actor {
            user_id: f.influencer.user_id,
            role: Role::Brand,
            followers_count: None,
        };
        let err = assert_err!(f.engine.create_order(&own, new_order(&f)).await);
        assert!(matches!(err, MarketError::SelfDealing));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        use OrderStatus::*;
        let f = fixture(dec!(2500)).await;
        let order = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();

        let steps = [
            (&f.influencer, Paid, InProgress),
            (&f.influencer, InProgress, Delivered),
            (&f.brand, Delivered, Completed),
        ];
        for (actor, from, to) in steps {
            let updated = assert_ok!(f.engine.transition_status(actor, order.id, from, to).await);
            assert_eq!(updated.status, to);
            assert_eq!(updated.amount, dec!(2500));
            assert_eq!(updated.platform_fee, dec!(250));
        }

        let err = assert_err!(
            f.engine
                .transition_status(&f.brand, order.id, Completed, Cancelled)
                .await
        );
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_wrong_role_is_unauthorized() {
        let f = fixture(dec!(5000)).await;
        let order = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();

        let err = assert_err!(
            f.engine
                .transition_status(&f.brand, order.id, OrderStatus::Paid, OrderStatus::InProgress)
                .await
        );
        assert!(matches!(err, MarketError::Unauthorized(_)));

        assert_ok!(
            f.engine
                .transition_status(
                    &f.influencer,
                    order.id,
                    OrderStatus::Paid,
                    OrderStatus::InProgress
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_status() {
        let f = fixture(dec!(5000)).await;
        let order = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();

        let err = assert_err!(
            f.engine
                .transition_status(&f.influencer, order.id, OrderStatus::Paid, OrderStatus::Delivered)
                .await
        );
        assert!(matches!(
            err,
            MarketError::InvalidTransition {
                from: OrderStatus::Paid,
                to: OrderStatus::Delivered
            }
        ));
        let stored = f.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_either_party_can_cancel_paid_order() {
        let f = fixture(dec!(700)).await;
        for actor in [&f.brand, &f.influencer] {
            let order = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();
            let cancelled = assert_ok!(
                f.engine
                    .transition_status(actor, order.id, OrderStatus::Paid, OrderStatus::Cancelled)
                    .await
            );
            assert_eq!(cancelled.status, OrderStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn test_stale_expected_status_is_rejected() {
        let f = fixture(dec!(5000)).await;
        let order = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();
        f.engine
            .transition_status(&f.influencer, order.id, OrderStatus::Paid, OrderStatus::InProgress)
            .await
            .unwrap();

        // The brand still sees `paid` and tries to cancel.
        let err = assert_err!(
            f.engine
                .transition_status(&f.brand, order.id, OrderStatus::Paid, OrderStatus::Cancelled)
                .await
        );
        assert!(matches!(
            err,
            MarketError::ConcurrentModification {
                expected: OrderStatus::Paid,
                found: OrderStatus::InProgress
            }
        ));
    }

    #[tokio::test]
    async fn test_outsider_cannot_see_or_move_order() {
        let f = fixture(dec!(5000)).await;
        let order = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();
        let outsider = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Influencer,
            followers_count: None,
        };

        let err = assert_err!(f.engine.get_order(&outsider, order.id).await);
        assert!(matches!(err, MarketError::Unauthorized(_)));
        let err = assert_err!(
            f.engine
                .transition_status(&outsider, order.id, OrderStatus::Paid, OrderStatus::InProgress)
                .await
        );
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_list_orders_paginates() {
        let f = fixture(dec!(300)).await;
        for _ in 0..3 {
            f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();
        }

        let (page, total) = f.engine.list_orders(&f.influencer, 1, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        let (page, _) = f.engine.list_orders(&f.brand, 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_summary_tracks_earnings_and_spend() {
        use OrderStatus::*;
        let f = fixture(dec!(5000)).await;
        let done = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();
        for (actor, from, to) in [
            (&f.influencer, Paid, InProgress),
            (&f.influencer, InProgress, Delivered),
            (&f.brand, Delivered, Completed),
        ] {
            f.engine.transition_status(actor, done.id, from, to).await.unwrap();
        }
        f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();
        let dropped = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();
        f.engine
            .transition_status(&f.brand, dropped.id, Paid, Cancelled)
            .await
            .unwrap();

        let earned = assert_ok!(f.engine.summary(&f.influencer).await);
        assert_eq!(earned.total_orders, 3);
        assert_eq!(earned.active_orders, 1);
        assert_eq!(earned.completed_orders, 1);
        assert_eq!(earned.completed_earnings, dec!(4500));

        let spent = assert_ok!(f.engine.summary(&f.brand).await);
        assert_eq!(spent.gross_amount, dec!(10000));
    }

    /// Lets another writer cancel the order just before each conditional update lands.
    struct CancelledUnderneath {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl OrderRepository for CancelledUnderneath {
        async fn insert_order(&self, order: &Order) -> anyhow::Result<()> {
            self.inner.insert_order(order).await
        }

        async fn get_order(&self, order_id: Uuid) -> anyhow::Result<Option<Order>> {
            self.inner.get_order(order_id).await
        }

        async fn update_order_status(
            &self,
            order_id: Uuid,
            expected: OrderStatus,
            next: OrderStatus,
        ) -> anyhow::Result<bool> {
            self.inner
                .update_order_status(order_id, expected, OrderStatus::Cancelled)
                .await?;
            self.inner.update_order_status(order_id, expected, next).await
        }

        async fn list_orders(
            &self,
            user_id: Uuid,
            role: Role,
            limit: i64,
            offset: i64,
        ) -> anyhow::Result<(Vec<Order>, i64)> {
            self.inner.list_orders(user_id, role, limit, offset).await
        }

        async fn order_summary(&self, user_id: Uuid, role: Role) -> anyhow::Result<OrderSummary> {
            self.inner.order_summary(user_id, role).await
        }
    }

    #[tokio::test]
    async fn test_lost_update_reports_current_status() {
        let f = fixture(dec!(5000)).await;
        let order = f.engine.create_order(&f.brand, new_order(&f)).await.unwrap();

        let racing = OrderEngine::new(
            Arc::new(f.store.clone()),
            Arc::new(CancelledUnderneath {
                inner: f.store.clone(),
            }),
        );
        let err = assert_err!(
            racing
                .transition_status(&f.influencer, order.id, OrderStatus::Paid, OrderStatus::InProgress)
                .await
        );
        assert!(matches!(
            err,
            MarketError::ConcurrentModification {
                expected: OrderStatus::Paid,
                found: OrderStatus::Cancelled
            }
        ));
        let stored = f.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }
}
