//! Plan activation, either as a direct free trial or through a verified gateway payment.

use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{MarketError, Result};
use crate::gateway::{
    CreateOrderRequest, OrderNotes, PaymentGateway, receipt_for, verify_checkout_signature,
};
use crate::plans::{self, DEFAULT_TRIAL_DAYS};
use crate::store::SubscriptionRepositoryRef;
use crate::types::{
    PaymentIntent, PaymentTransaction, PlanType, Subscription, SubscriptionStatus,
    TransactionStatus,
};

const TRANSACTION_KIND_SUBSCRIPTION: &str = "subscription";

/// Parameters the client needs to open the gateway checkout widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
    pub order_id: String,
    /// Amount in the currency's smallest unit.
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// Outcome of choosing a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionIntent {
    /// Free plan, trial started right away.
    Activated(Subscription),
    /// Paid plan, waiting for the checkout callback.
    Checkout(CheckoutOrder),
}

/// Fields returned by the checkout widget after payment.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub gateway_payment_id: String,
    pub gateway_order_id: String,
    pub gateway_signature: String,
    pub plan_type: String,
}

#[derive(Clone)]
pub struct SubscriptionEngine {
    subscriptions: SubscriptionRepositoryRef,
    gateway: Option<Arc<dyn PaymentGateway>>,
    signing_secret: Option<String>,
}

impl SubscriptionEngine {
    /// `gateway` and `signing_secret` may be absent; paid flows then fail with
    /// `GatewayNotConfigured` while free trials keep working.
    pub fn new(
        subscriptions: SubscriptionRepositoryRef,
        gateway: Option<Arc<dyn PaymentGateway>>,
        signing_secret: Option<String>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            signing_secret,
        }
    }

    pub async fn create_intent(&self, user_id: Uuid, plan_type: &str) -> Result<SubscriptionIntent> {
        let plan_type: PlanType = plan_type.parse()?;
        let plan = plans::plan(plan_type);

        if plan.is_free() {
            let now = Utc::now();
            let trial_ends_at = now + Duration::days(plan.trial_days.unwrap_or(DEFAULT_TRIAL_DAYS));
            let subscription = Subscription {
                id: Uuid::new_v4(),
                user_id,
                plan_type,
                status: SubscriptionStatus::Trial,
                amount: plan.price,
                trial_ends_at: Some(trial_ends_at),
                current_period_end: Some(trial_ends_at),
                created_at: now,
            };
            self.subscriptions.insert_subscription(&subscription).await?;

            info!(
                subscription_id = %subscription.id,
                user_id = %user_id,
                plan = %plan_type,
                trial_ends_at = %trial_ends_at,
                "trial started"
            );
            return Ok(SubscriptionIntent::Activated(subscription));
        }

        let gateway = match (&self.gateway, &self.signing_secret) {
            (Some(gateway), Some(_)) => gateway,
            _ => return Err(MarketError::GatewayNotConfigured),
        };

        let now = Utc::now();
        let req = CreateOrderRequest {
            amount: plan.price_minor_units(),
            currency: plan.currency.to_string(),
            receipt: receipt_for(&user_id, now.timestamp_millis()),
            notes: OrderNotes {
                user_id: user_id.to_string(),
                plan_type: plan_type.to_string(),
            },
        };
        let order = gateway
            .create_order(&req)
            .await
            .map_err(|e| MarketError::PaymentGatewayError(e.to_string()))?;

        let intent = PaymentIntent {
            gateway_order_id: order.id.clone(),
            user_id,
            plan_type,
            amount: plan.price,
            currency: order.currency.clone(),
            created_at: now,
        };
        self.subscriptions.insert_payment_intent(&intent).await?;

        info!(
            user_id = %user_id,
            plan = %plan_type,
            gateway_order_id = %order.id,
            amount = order.amount,
            "checkout opened"
        );
        Ok(SubscriptionIntent::Checkout(CheckoutOrder {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: gateway.key_id().to_string(),
        }))
    }

    /// Verifies the checkout callback and activates the paid plan.
    ///
    /// Nothing is written unless the signature matches. The billed amount is the
    /// one quoted when the checkout was opened. Replaying an already settled
    /// gateway order returns the subscription it produced.
    pub async fn verify_and_activate(
        &self,
        user_id: Uuid,
        confirmation: PaymentConfirmation,
    ) -> Result<Subscription> {
        let secret = self
            .signing_secret
            .as_deref()
            .ok_or(MarketError::GatewayNotConfigured)?;

        if !verify_checkout_signature(
            secret,
            &confirmation.gateway_order_id,
            &confirmation.gateway_payment_id,
            &confirmation.gateway_signature,
        ) {
            warn!(
                user_id = %user_id,
                gateway_order_id = %confirmation.gateway_order_id,
                gateway_payment_id = %confirmation.gateway_payment_id,
                "payment signature mismatch"
            );
            return Err(MarketError::InvalidSignature);
        }

        let requested: PlanType = confirmation.plan_type.parse()?;
        let intent = self
            .subscriptions
            .get_payment_intent(&confirmation.gateway_order_id)
            .await?
            .ok_or_else(|| {
                MarketError::UnknownPaymentIntent(confirmation.gateway_order_id.clone())
            })?;
        if intent.user_id != user_id {
            return Err(MarketError::Unauthorized(
                "payment belongs to another user".into(),
            ));
        }
        if intent.plan_type != requested {
            return Err(MarketError::PlanMismatch {
                expected: intent.plan_type,
                requested,
            });
        }

        if let Some(settled) = self.settled_subscription(&intent.gateway_order_id).await? {
            return Ok(settled);
        }

        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id,
            plan_type: intent.plan_type,
            status: SubscriptionStatus::Active,
            amount: intent.amount,
            trial_ends_at: None,
            current_period_end: Some(one_month_after(now)?),
            created_at: now,
        };
        let transaction = PaymentTransaction {
            id: Uuid::new_v4(),
            user_id,
            subscription_id: subscription.id,
            kind: TRANSACTION_KIND_SUBSCRIPTION.to_string(),
            amount: subscription.amount,
            status: TransactionStatus::Success,
            gateway_payment_id: confirmation.gateway_payment_id,
            gateway_order_id: confirmation.gateway_order_id,
            created_at: now,
        };
        if !self
            .subscriptions
            .activate_paid_subscription(&subscription, &transaction)
            .await?
        {
            info!(
                user_id = %user_id,
                gateway_order_id = %intent.gateway_order_id,
                "gateway order settled concurrently"
            );
            return self
                .settled_subscription(&intent.gateway_order_id)
                .await?
                .ok_or(MarketError::NotFound("subscription"));
        }

        info!(
            subscription_id = %subscription.id,
            user_id = %user_id,
            plan = %subscription.plan_type,
            amount = %subscription.amount,
            gateway_payment_id = %transaction.gateway_payment_id,
            "subscription activated"
        );
        Ok(subscription)
    }

    async fn settled_subscription(&self, gateway_order_id: &str) -> Result<Option<Subscription>> {
        let Some(settled) = self
            .subscriptions
            .find_transaction_by_gateway_order(gateway_order_id)
            .await?
        else {
            return Ok(None);
        };
        let subscription = self
            .subscriptions
            .get_subscription(settled.subscription_id)
            .await?
            .ok_or(MarketError::NotFound("subscription"))?;
        Ok(Some(subscription))
    }

    /// The user's most recent subscription and whether it is in force now.
    pub async fn current(&self, user_id: Uuid) -> Result<Option<(Subscription, bool)>> {
        let now = Utc::now();
        let latest = self.subscriptions.latest_subscription(user_id).await?;
        Ok(latest.map(|s| {
            let active = plans::is_subscription_active(s.status, s.current_period_end, now);
            (s, active)
        }))
    }
}

fn one_month_after(at: DateTime<Utc>) -> Result<DateTime<Utc>> {
    at.checked_add_months(Months::new(1))
        .ok_or_else(|| MarketError::Store(anyhow::anyhow!("period end out of range for {at}")))
}
