use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

use crate::error::ApiErrorWithMeta;
use crate::orders::{NewOrder, OrderEngine};
use crate::plans::{self, PLANS, Plan};
use crate::responses::{ApiOk, Pagination, RequestMeta, meta_middleware};
use crate::store::DirectoryRepositoryRef;
use crate::subscriptions::{
    CheckoutOrder, PaymentConfirmation, SubscriptionEngine, SubscriptionIntent,
};
use crate::types::{Actor, Order, OrderStatus, OrderSummary, PlanType, Subscription};

const DEFAULT_PER_PAGE: u32 = 20;

/// The application state.
#[derive(Clone)]
pub struct AppState {
    /// Profiles and services, used to resolve callers.
    pub directory: DirectoryRepositoryRef,
    /// The order engine.
    pub orders: OrderEngine,
    /// The subscription and payment engine.
    pub subscriptions: SubscriptionEngine,
}

/// The request to place an order.
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    /// The influencer selling the service.
    pub influencer_id: Uuid,
    /// The service being bought.
    pub service_id: Uuid,
    /// The brief for the influencer.
    pub requirements: Option<String>,
}

/// The request to move an order to a new status.
#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    /// The target status.
    pub status: OrderStatus,
    /// The status the caller last saw.
    pub expected_status: OrderStatus,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct CreateSubscriptionRequest {
    #[serde(rename = "planType")]
    pub plan_type: String,
}

/// The checkout widget callback, forwarded by the client.
#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_payment_id: String,
    pub razorpay_order_id: String,
    pub razorpay_signature: String,
    #[serde(rename = "planType")]
    pub plan_type: String,
}

/// Either the started trial or the parameters for the checkout widget.
#[derive(Serialize)]
#[serde(untagged)]
pub enum CreateSubscriptionResponse {
    Activated { subscription: Subscription },
    Checkout(CheckoutOrder),
}

#[derive(Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub subscription: Subscription,
}

#[derive(Serialize)]
pub struct CurrentSubscriptionResponse {
    pub subscription: Option<Subscription>,
    pub active: bool,
}

#[derive(Serialize)]
pub struct RecommendedPlanResponse {
    pub plan_type: PlanType,
    pub plan: &'static Plan,
}

pub fn init_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/plans", get(list_plans_handler))
        .route("/api/plans/recommended", get(recommended_plan_handler))
        .route(
            "/api/orders",
            post(create_order_handler).get(list_orders_handler),
        )
        .route("/api/orders/summary", get(order_summary_handler))
        .route("/api/orders/{id}", get(get_order_handler))
        .route("/api/orders/{id}/status", patch(update_order_status_handler))
        .route("/api/subscription", get(current_subscription_handler))
        .route("/api/subscription/create", post(create_subscription_handler))
        .route("/api/subscription/verify", post(verify_payment_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(meta_middleware))
}

async fn list_plans_handler(
    Extension(meta): Extension<RequestMeta>,
) -> ApiOk<&'static [Plan]> {
    ApiOk::ok("plans fetched", &PLANS[..], meta)
}

async fn recommended_plan_handler(
    actor: Actor,
    Extension(meta): Extension<RequestMeta>,
) -> ApiOk<RecommendedPlanResponse> {
    let plan_type = plans::get_plan_for_user(actor.role, actor.followers_count.unwrap_or(0));
    ApiOk::ok(
        "plan recommended",
        RecommendedPlanResponse {
            plan_type,
            plan: plans::plan(plan_type),
        },
        meta,
    )
}

async fn create_order_handler(
    State(st): State<AppState>,
    actor: Actor,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<ApiOk<Order>, ApiErrorWithMeta> {
    let order = st
        .orders
        .create_order(
            &actor,
            NewOrder {
                influencer_id: req.influencer_id,
                service_id: req.service_id,
                requirements: req.requirements,
            },
        )
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    Ok(ApiOk::created("order created", order, meta))
}

async fn list_orders_handler(
    State(st): State<AppState>,
    actor: Actor,
    Extension(meta): Extension<RequestMeta>,
    Query(q): Query<ListOrdersQuery>,
) -> Result<ApiOk<Vec<Order>>, ApiErrorWithMeta> {
    let page = q.page.unwrap_or(1).max(1);
    let per_page = q.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, 100);

    let (orders, total) = st
        .orders
        .list_orders(&actor, page, per_page)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    Ok(ApiOk::ok("orders fetched", orders, meta).paginated(Pagination::new(page, per_page, total)))
}

async fn order_summary_handler(
    State(st): State<AppState>,
    actor: Actor,
    Extension(meta): Extension<RequestMeta>,
) -> Result<ApiOk<OrderSummary>, ApiErrorWithMeta> {
    let summary = st
        .orders
        .summary(&actor)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    Ok(ApiOk::ok("order summary fetched", summary, meta))
}

async fn get_order_handler(
    State(st): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Extension(meta): Extension<RequestMeta>,
) -> Result<ApiOk<Order>, ApiErrorWithMeta> {
    let order = st
        .orders
        .get_order(&actor, id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    Ok(ApiOk::ok("order fetched", order, meta))
}

async fn update_order_status_handler(
    State(st): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<ApiOk<Order>, ApiErrorWithMeta> {
    let order = st
        .orders
        .transition_status(&actor, id, req.expected_status, req.status)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    Ok(ApiOk::ok("order status updated", order, meta))
}

async fn current_subscription_handler(
    State(st): State<AppState>,
    actor: Actor,
    Extension(meta): Extension<RequestMeta>,
) -> Result<ApiOk<CurrentSubscriptionResponse>, ApiErrorWithMeta> {
    let current = st
        .subscriptions
        .current(actor.user_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    let body = match current {
        Some((subscription, active)) => CurrentSubscriptionResponse {
            subscription: Some(subscription),
            active,
        },
        None => CurrentSubscriptionResponse {
            subscription: None,
            active: false,
        },
    };
    Ok(ApiOk::ok("subscription fetched", body, meta))
}

async fn create_subscription_handler(
    State(st): State<AppState>,
    actor: Actor,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<ApiOk<CreateSubscriptionResponse>, ApiErrorWithMeta> {
    let intent = st
        .subscriptions
        .create_intent(actor.user_id, &req.plan_type)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    Ok(match intent {
        SubscriptionIntent::Activated(subscription) => ApiOk::created(
            "trial started",
            CreateSubscriptionResponse::Activated { subscription },
            meta,
        ),
        SubscriptionIntent::Checkout(order) => ApiOk::ok(
            "checkout opened",
            CreateSubscriptionResponse::Checkout(order),
            meta,
        ),
    })
}

async fn verify_payment_handler(
    State(st): State<AppState>,
    actor: Actor,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<ApiOk<VerifyPaymentResponse>, ApiErrorWithMeta> {
    let subscription = st
        .subscriptions
        .verify_and_activate(
            actor.user_id,
            PaymentConfirmation {
                gateway_payment_id: req.razorpay_payment_id,
                gateway_order_id: req.razorpay_order_id,
                gateway_signature: req.razorpay_signature,
                plan_type: req.plan_type,
            },
        )
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;

    Ok(ApiOk::ok(
        "payment verified",
        VerifyPaymentResponse {
            success: true,
            subscription,
        },
        meta,
    ))
}
