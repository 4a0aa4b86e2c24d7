//! Identity extraction
//!
//! The server runs behind a gateway that authenticates sessions and
//! forwards the caller's identity as headers:
//! - `x-user-id`: account id (required)
//! - `x-user-role`: `admin` for administrators, anything else means `user`
//!
//! Handlers take `Identity` to require a caller and `AdminIdentity` to
//! require the admin role on top of it.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::types::Role;

/// Caller identity forwarded by the auth gateway.
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing x-user-id header".to_string()))?
            .to_string();

        // Unknown role values fall back to the regular user role.
        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
            .and_then(Role::from_str)
            .unwrap_or(Role::User);

        Ok(Identity { user_id, role })
    }
}

/// Identity that must carry the admin role.
pub struct AdminIdentity(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        if !identity.role.is_admin() {
            return Err(AppError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminIdentity(identity))
    }
}
