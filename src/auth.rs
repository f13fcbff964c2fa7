use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{ApiError, ApiErrorWithMeta, E_DB_FAILURE, E_UNAUTHENTICATED};
use crate::responses::RequestMeta;
use crate::types::Actor;

/// Set by the upstream auth layer once the session is validated.
pub const USER_ID_HEADER: &str = "x-user-id";

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiErrorWithMeta;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let meta = parts
            .extensions
            .get::<RequestMeta>()
            .cloned()
            .unwrap_or_else(|| RequestMeta::new(None));
        let unauthenticated = |msg: &str| {
            ApiError::Unauthenticated(msg.to_string())
                .with_meta(meta.clone())
                .with_code(E_UNAUTHENTICATED)
        };

        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| unauthenticated("missing user identity"))?
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or_else(|| unauthenticated("invalid user identity"))?;

        // The role always comes from the stored profile, never from the request.
        let profile = state
            .directory
            .get_profile(user_id)
            .await
            .map_err(|e| {
                ApiError::Internal(e)
                    .with_meta(meta.clone())
                    .with_code(E_DB_FAILURE)
            })?
            .ok_or_else(|| unauthenticated("no profile for user"))?;

        Ok(Actor {
            user_id,
            role: profile.role,
            followers_count: profile.followers_count,
        })
    }
}
