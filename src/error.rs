use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::responses::RequestMeta;
use crate::types::{OrderStatus, PlanType};

pub const E_UNAUTHENTICATED: &str = "UNAUTHENTICATED";
pub const E_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const E_NOT_FOUND: &str = "NOT_FOUND";
pub const E_INVALID_TRANSITION: &str = "INVALID_TRANSITION";
pub const E_CONCURRENT_MODIFICATION: &str = "CONCURRENT_MODIFICATION";
pub const E_SERVICE_INACTIVE: &str = "SERVICE_INACTIVE";
pub const E_SELF_DEALING: &str = "SELF_DEALING";
pub const E_BAD_AMOUNT: &str = "BAD_AMOUNT";
pub const E_UNKNOWN_PLAN: &str = "UNKNOWN_PLAN";
pub const E_PLAN_MISMATCH: &str = "PLAN_MISMATCH";
pub const E_UNKNOWN_PAYMENT_INTENT: &str = "UNKNOWN_PAYMENT_INTENT";
pub const E_INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
pub const E_GATEWAY_NOT_CONFIGURED: &str = "GATEWAY_NOT_CONFIGURED";
pub const E_PAYMENT_GATEWAY: &str = "PAYMENT_GATEWAY_ERROR";
pub const E_DB_FAILURE: &str = "DB_FAILURE";

/// Failures of the order and subscription engines.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("cannot move order from `{from}` to `{to}`")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("not allowed: {0}")]
    Unauthorized(String),

    #[error("order changed concurrently, expected `{expected}` but found `{found}`")]
    ConcurrentModification {
        expected: OrderStatus,
        found: OrderStatus,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("service is not accepting orders")]
    ServiceInactive,

    #[error("brand and influencer must be different users")]
    SelfDealing,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("unknown plan `{0}`")]
    UnknownPlan(String),

    #[error("payment was opened for plan `{expected}`, not `{requested}`")]
    PlanMismatch {
        expected: PlanType,
        requested: PlanType,
    },

    #[error("no payment intent for gateway order `{0}`")]
    UnknownPaymentIntent(String),

    #[error("invalid payment signature")]
    InvalidSignature,

    #[error("payment gateway not configured")]
    GatewayNotConfigured,

    #[error("payment gateway error: {0}")]
    PaymentGatewayError(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = core::result::Result<T, MarketError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthenticated(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

#[derive(Debug)]
pub struct ApiErrorWithMeta {
    error: ApiError,
    meta: RequestMeta,
    code: Option<String>,
}

impl ApiError {
    pub fn with_meta(self, meta: RequestMeta) -> ApiErrorWithMeta {
        ApiErrorWithMeta {
            error: self,
            meta,
            code: None,
        }
    }
}

impl ApiErrorWithMeta {
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

impl MarketError {
    /// The stable code clients can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::InvalidTransition { .. } => E_INVALID_TRANSITION,
            MarketError::Unauthorized(_) => E_UNAUTHORIZED,
            MarketError::ConcurrentModification { .. } => E_CONCURRENT_MODIFICATION,
            MarketError::NotFound(_) => E_NOT_FOUND,
            MarketError::ServiceInactive => E_SERVICE_INACTIVE,
            MarketError::SelfDealing => E_SELF_DEALING,
            MarketError::InvalidAmount => E_BAD_AMOUNT,
            MarketError::UnknownPlan(_) => E_UNKNOWN_PLAN,
            MarketError::PlanMismatch { .. } => E_PLAN_MISMATCH,
            MarketError::UnknownPaymentIntent(_) => E_UNKNOWN_PAYMENT_INTENT,
            MarketError::InvalidSignature => E_INVALID_SIGNATURE,
            MarketError::GatewayNotConfigured => E_GATEWAY_NOT_CONFIGURED,
            MarketError::PaymentGatewayError(_) => E_PAYMENT_GATEWAY,
            MarketError::Store(_) => E_DB_FAILURE,
        }
    }

    pub fn with_meta(self, meta: RequestMeta) -> ApiErrorWithMeta {
        let code = self.code();
        let message = self.to_string();
        let error = match self {
            MarketError::InvalidTransition { .. }
            | MarketError::ServiceInactive
            | MarketError::SelfDealing
            | MarketError::InvalidAmount
            | MarketError::UnknownPlan(_)
            | MarketError::PlanMismatch { .. }
            | MarketError::UnknownPaymentIntent(_)
            | MarketError::InvalidSignature => ApiError::BadRequest(message),
            MarketError::Unauthorized(_) => ApiError::Forbidden(message),
            MarketError::NotFound(_) => ApiError::NotFound(message),
            MarketError::ConcurrentModification { .. } => ApiError::Conflict(message),
            MarketError::GatewayNotConfigured => ApiError::Unavailable(message),
            MarketError::PaymentGatewayError(_) => ApiError::BadGateway(message),
            MarketError::Store(e) => ApiError::Internal(e),
        };
        error.with_meta(meta).with_code(code)
    }
}

impl IntoResponse for ApiErrorWithMeta {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.error {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(e) => {
                error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let mut body = json!({
            "request_id": self.meta.request_id,
            "error": error_message,
        });
        if let Some(code) = self.code {
            body["code"] = json!(code);
        }

        (status, Json(body)).into_response()
    }
}
