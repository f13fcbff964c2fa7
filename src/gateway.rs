//! Payment gateway port and the Razorpay REST client behind it.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://api.razorpay.com/v1";
/// Razorpay rejects receipts longer than this.
const MAX_RECEIPT_LEN: usize = 40;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderNotes {
    pub user_id: String,
    pub plan_type: String,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in the currency's smallest unit.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: OrderNotes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    description: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The public key id handed to the checkout widget.
    fn key_id(&self) -> &str;

    async fn create_order(&self, req: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;
}

/// Hex digits of the user id kept in a receipt.
const RECEIPT_USER_PREFIX: usize = 12;

/// Builds a receipt id from a user id prefix and the full millisecond timestamp.
pub fn receipt_for(user_id: &uuid::Uuid, timestamp_ms: i64) -> String {
    let user = user_id.simple().to_string();
    let mut receipt = format!("sub_{}_{}", &user[..RECEIPT_USER_PREFIX], timestamp_ms);
    receipt.truncate(MAX_RECEIPT_LEN);
    receipt
}

/// Hex HMAC-SHA256 over `order_id|payment_id`, the checkout callback signature.
pub fn checkout_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a checkout callback signature in constant time.
pub fn verify_checkout_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&provided).is_ok()
}

pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(api_base: impl Into<String>, key_id: String, key_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, req: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(req)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.description)
                .unwrap_or_else(|| "Failed to create order".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<GatewayOrder>(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}; body={body}")))
    }
}
