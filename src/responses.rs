use axum::{
    Json,
    body::Body,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Correlation id, taken from the upstream proxy when present.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request envelope data, echoed in every success and error body.
#[derive(Clone, Debug, Serialize)]
pub struct RequestMeta {
    pub request_id: String,
    pub request_at: String, // RFC3339
    pub timestamp: i64,     // unix seconds
}

impl RequestMeta {
    pub fn new(request_id: Option<&str>) -> Self {
        let now: DateTime<Utc> = Utc::now();
        let request_id = request_id
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= 128)
            .map_or_else(|| Uuid::new_v4().to_string(), String::from);
        Self {
            request_id,
            request_at: now.to_rfc3339(),
            timestamp: now.timestamp(),
        }
    }
}

pub async fn meta_middleware(mut req: Request<Body>, next: Next) -> Response {
    let incoming = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let meta = RequestMeta::new(incoming);
    let request_id = meta.request_id.clone();
    req.extensions_mut().insert(meta);

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

#[derive(Clone, Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, total: i64) -> Self {
        let total = total.max(0) as u64;
        let per_page = per_page.max(1);
        Self {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(u64::from(per_page)) as u32,
        }
    }
}

#[derive(Serialize)]
pub struct SuccessEnvelope<T> {
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub meta: RequestMeta,
}

pub struct ApiOk<T> {
    status: StatusCode,
    body: SuccessEnvelope<T>,
}

impl<T> ApiOk<T> {
    fn with_status(status: StatusCode, message: impl Into<String>, data: T, meta: RequestMeta) -> Self {
        Self {
            status,
            body: SuccessEnvelope {
                message: message.into(),
                data,
                pagination: None,
                meta,
            },
        }
    }

    pub fn ok(message: impl Into<String>, data: T, meta: RequestMeta) -> Self {
        Self::with_status(StatusCode::OK, message, data, meta)
    }

    pub fn created(message: impl Into<String>, data: T, meta: RequestMeta) -> Self {
        Self::with_status(StatusCode::CREATED, message, data, meta)
    }

    pub fn paginated(mut self, pagination: Pagination) -> Self {
        self.body.pagination = Some(pagination);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiOk<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
