//! Referral API
//!
//! - GET /api/referral/stats - The caller's referral code, referred
//!   accounts, and commission earned from their winning wagers

use axum::{extract::State, routing::get, Json, Router};

use crate::api::auth::Identity;
use crate::api::trades::ApiResponse;
use crate::error::AppError;
use crate::services::LedgerError;
use crate::types::ReferralStats;
use crate::AppState;

/// Create referral router.
pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

/// GET /api/referral/stats
async fn stats(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiResponse<ReferralStats>>, AppError> {
    let stats = state
        .store
        .referral_stats(&identity.user_id)
        .map_err(|e| match e {
            LedgerError::AccountNotFound(id) => AppError::NotFound(format!("account {}", id)),
            e => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(ApiResponse { data: stats }))
}
