//! Caller identity taken from a header set by the proxy in front of
//! the service.
use axum::extract::FromRequestParts;
use http::request::Parts;

use super::public::ApiError;
use super::state::SharedState;
use crate::core::ChatError;

/// The authenticated user, if any. Rejects the request when auth is
/// required and the identity header is missing.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Option<String>);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let (header, required) = {
            let shared_state = state.read().expect("Unable to read share state");
            (
                shared_state.config.auth_header.clone(),
                shared_state.config.require_auth,
            )
        };

        let user = parts
            .headers
            .get(header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        if user.is_none() && required {
            return Err(ChatError::Unauthorized(header).into());
        }
        Ok(AuthUser(user))
    }
}
