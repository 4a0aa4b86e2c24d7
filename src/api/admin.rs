//! Admin API
//!
//! Role-gated administration endpoints:
//! - GET /api/admin/users - List all accounts
//! - PUT /api/admin/users/:id/balance - Override an account balance
//! - PUT /api/admin/users/:id/kyc - Update an account's KYC status
//! - GET /api/admin/trades - Review all wagers with owner contact info
//! - GET /api/admin/settings - Read platform settings
//! - PUT /api/admin/settings - Update platform settings

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::AdminIdentity;
use crate::api::trades::{list_limit, ApiResponse};
use crate::error::AppError;
use crate::services::LedgerError;
use crate::types::{KycStatus, UserAccount, WagerWithOwner};
use crate::AppState;

/// Create admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/balance", put(set_balance))
        .route("/users/:id/kyc", put(set_kyc))
        .route("/trades", get(list_trades))
        .route("/settings", get(get_settings).put(update_settings))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct BalanceUpdate {
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycUpdate {
    pub kyc_status: KycStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    pub commission_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct ListTradesQuery {
    pub limit: Option<usize>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/admin/users
async fn list_users(
    State(state): State<AppState>,
    _admin: AdminIdentity,
) -> Json<ApiResponse<Vec<UserAccount>>> {
    Json(ApiResponse {
        data: state.store.all_users(),
    })
}

/// PUT /api/admin/users/:id/balance
///
/// Overwrite an account's balance. Negative balances are rejected.
async fn set_balance(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Path(id): Path<String>,
    Json(request): Json<BalanceUpdate>,
) -> Result<Json<ApiResponse<UserAccount>>, AppError> {
    if !request.balance.is_finite() || request.balance < 0.0 {
        return Err(AppError::BadRequest(format!(
            "balance must be non-negative, got {}",
            request.balance
        )));
    }

    let account = state
        .store
        .set_balance(&id, request.balance)
        .map_err(admin_error)?;
    Ok(Json(ApiResponse { data: account }))
}

/// PUT /api/admin/users/:id/kyc
async fn set_kyc(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Path(id): Path<String>,
    Json(request): Json<KycUpdate>,
) -> Result<Json<ApiResponse<UserAccount>>, AppError> {
    let account = state
        .store
        .set_kyc_status(&id, request.kyc_status)
        .map_err(admin_error)?;
    Ok(Json(ApiResponse { data: account }))
}

/// GET /api/admin/trades
///
/// All wagers joined with owner contact info, most recent first.
async fn list_trades(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(query): Query<ListTradesQuery>,
) -> Json<ApiResponse<Vec<WagerWithOwner>>> {
    Json(ApiResponse {
        data: state.store.all_wagers(list_limit(query.limit)),
    })
}

/// GET /api/admin/settings
async fn get_settings(
    State(state): State<AppState>,
    _admin: AdminIdentity,
) -> Json<ApiResponse<PlatformSettings>> {
    Json(ApiResponse {
        data: PlatformSettings {
            commission_rate: state.store.commission_rate(),
        },
    })
}

/// PUT /api/admin/settings
async fn update_settings(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Json(request): Json<PlatformSettings>,
) -> Result<Json<ApiResponse<PlatformSettings>>, AppError> {
    if !request.commission_rate.is_finite()
        || !(0.0..=100.0).contains(&request.commission_rate)
    {
        return Err(AppError::BadRequest(format!(
            "commission rate must be between 0 and 100, got {}",
            request.commission_rate
        )));
    }

    state
        .store
        .set_setting("commission_rate", &request.commission_rate.to_string())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(ApiResponse {
        data: PlatformSettings {
            commission_rate: state.store.commission_rate(),
        },
    }))
}

fn admin_error(e: LedgerError) -> AppError {
    match e {
        LedgerError::AccountNotFound(id) => AppError::NotFound(format!("account {}", id)),
        e => AppError::Internal(e.to_string()),
    }
}
