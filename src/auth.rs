//! Request identity. Authentication itself happens upstream; this extractor
//! trusts the user id the edge proxy injects into the request.

use crate::errors::ServiceError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, resolved from the `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing user identity".to_string()))?;

        let user_id = Uuid::parse_str(raw)
            .map_err(|_| ServiceError::Unauthorized("malformed user identity".to_string()))?;

        Ok(Self { user_id })
    }
}
