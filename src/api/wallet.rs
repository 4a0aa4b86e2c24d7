//! Wallet API
//!
//! Demo-money wallet endpoints:
//! - POST /api/wallet/deposit - Credit demo funds (completes immediately)
//! - POST /api/wallet/withdraw - Open a pending withdrawal and debit it
//! - GET /api/wallet/transactions - List the caller's wallet transactions

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth::Identity;
use crate::api::trades::{list_limit, ApiResponse};
use crate::error::AppError;
use crate::services::LedgerError;
use crate::types::Transaction;
use crate::AppState;

/// Create wallet router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deposit", post(deposit))
        .route("/withdraw", post(withdraw))
        .route("/transactions", get(transactions))
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<usize>,
}

/// POST /api/wallet/deposit
async fn deposit(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<AmountRequest>,
) -> Result<Json<ApiResponse<Transaction>>, AppError> {
    validate_amount(request.amount)?;
    let record = state
        .store
        .deposit(&identity.user_id, request.amount)
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse { data: record }))
}

/// POST /api/wallet/withdraw
///
/// The balance is debited right away; the transaction stays pending for
/// manual review.
async fn withdraw(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<AmountRequest>,
) -> Result<Json<ApiResponse<Transaction>>, AppError> {
    validate_amount(request.amount)?;
    let record = state
        .store
        .withdraw(&identity.user_id, request.amount)
        .map_err(ledger_error)?;
    Ok(Json(ApiResponse { data: record }))
}

/// GET /api/wallet/transactions
async fn transactions(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<TransactionsQuery>,
) -> Json<ApiResponse<Vec<Transaction>>> {
    let records = state
        .store
        .transactions_for_owner(&identity.user_id, list_limit(query.limit));
    Json(ApiResponse { data: records })
}

fn validate_amount(amount: f64) -> Result<(), AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::BadRequest(format!(
            "amount must be a positive number, got {}",
            amount
        )));
    }
    Ok(())
}

fn ledger_error(e: LedgerError) -> AppError {
    match e {
        LedgerError::AccountNotFound(id) => AppError::NotFound(format!("account {}", id)),
        LedgerError::InsufficientFunds { needed, available } => AppError::BadRequest(format!(
            "insufficient funds: need {}, have {}",
            needed, available
        )),
        e => AppError::Internal(e.to_string()),
    }
}
