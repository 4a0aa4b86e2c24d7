//! User API
//!
//! - GET /api/user/profile - The caller's account profile

use axum::{extract::State, routing::get, Json, Router};

use crate::api::auth::Identity;
use crate::api::trades::ApiResponse;
use crate::error::AppError;
use crate::types::Profile;
use crate::AppState;

/// Create user router.
pub fn router() -> Router<AppState> {
    Router::new().route("/profile", get(profile))
}

/// GET /api/user/profile
///
/// The caller's account: contact info, balance, KYC status, referral code.
async fn profile(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiResponse<Profile>>, AppError> {
    let account = state
        .store
        .get_account(&identity.user_id)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("account {}", identity.user_id)))?;

    Ok(Json(ApiResponse {
        data: account.into(),
    }))
}
