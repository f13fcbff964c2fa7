//! Order settlement and subscription billing for a creator/brand marketplace.

pub mod api;
mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod plans;
mod responses;
pub mod store;
pub mod subscriptions;
pub mod types;

use anyhow::Context;
use anyhow::Result;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;

pub use api::{AppState, init_router};
pub use auth::USER_ID_HEADER;
use crate::config::Config;
use crate::gateway::{PaymentGateway, RazorpayClient};
use crate::orders::OrderEngine;
use crate::store::PgStore;
use crate::subscriptions::SubscriptionEngine;

/// The platform's cut of every order, in percent. Applied once at order creation.
pub const FEE_PERCENT: u32 = 10;

/// Initializes the database pool.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")?;
    Ok(pool)
}

/// Wires the engines to Postgres and, when credentials are present, to Razorpay.
pub fn build_state(config: &Config, pool: PgPool) -> AppState {
    let store = Arc::new(PgStore::new(pool));

    let gateway = config.gateway_credentials().map(|(key_id, key_secret)| {
        Arc::new(RazorpayClient::new(
            config.razorpay_api_base.clone(),
            key_id.to_string(),
            key_secret.to_string(),
        )) as Arc<dyn PaymentGateway>
    });

    AppState {
        directory: store.clone(),
        orders: OrderEngine::new(store.clone(), store.clone()),
        subscriptions: SubscriptionEngine::new(
            store,
            gateway,
            config.signing_secret().map(String::from),
        ),
    }
}
