use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

use creator_market::gateway::{CreateOrderRequest, GatewayError, GatewayOrder, PaymentGateway};
use creator_market::orders::OrderEngine;
use creator_market::store::InMemoryStore;
use creator_market::subscriptions::SubscriptionEngine;
use creator_market::types::{Profile, Role, Service};
use creator_market::{AppState, USER_ID_HEADER, init_router};

pub const SECRET: &str = "it_secret";
pub const GATEWAY_ORDER_ID: &str = "order_it_1";

/// Hands out a fixed order id for every checkout.
pub struct FixedGateway;

#[async_trait]
impl PaymentGateway for FixedGateway {
    fn key_id(&self) -> &str {
        "rzp_test_it"
    }

    async fn create_order(&self, req: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        Ok(GatewayOrder {
            id: GATEWAY_ORDER_ID.to_string(),
            amount: req.amount,
            currency: req.currency.clone(),
        })
    }
}

pub struct TestApp {
    pub base_url: String,
    pub store: InMemoryStore,
    pub client: reqwest::Client,
    pub brand: Uuid,
    pub influencer: Uuid,
    pub service_id: Uuid,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn as_user(&self, builder: reqwest::RequestBuilder, user: Uuid) -> reqwest::RequestBuilder {
        builder.header(USER_ID_HEADER, user.to_string())
    }
}

/// Boots the router on an ephemeral port over an in-memory store seeded with
/// one brand, one influencer and one active service priced at 5000.
pub async fn spawn_app() -> TestApp {
    let store = InMemoryStore::new();
    let brand = Uuid::new_v4();
    let influencer = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    store
        .put_profile(Profile {
            id: brand,
            role: Role::Brand,
            followers_count: None,
        })
        .await;
    store
        .put_profile(Profile {
            id: influencer,
            role: Role::Influencer,
            followers_count: Some(250_000),
        })
        .await;
    store
        .put_service(Service {
            id: service_id,
            influencer_id: influencer,
            title: "Instagram story".into(),
            price: Decimal::from(5000),
            is_active: true,
        })
        .await;

    let shared = Arc::new(store.clone());
    let state = AppState {
        directory: shared.clone(),
        orders: OrderEngine::new(shared.clone(), shared.clone()),
        subscriptions: SubscriptionEngine::new(
            shared,
            Some(Arc::new(FixedGateway)),
            Some(SECRET.to_string()),
        ),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, init_router(state)).await.expect("serve");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        store,
        client: reqwest::Client::new(),
        brand,
        influencer,
        service_id,
    }
}
