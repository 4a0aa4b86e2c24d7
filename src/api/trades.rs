//! Trades API
//!
//! Endpoints for placing and reviewing wagers:
//! - POST /api/trades/place - Place a wager on the next price direction
//! - GET /api/trades/my-trades - List the caller's wagers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::Identity;
use crate::services::TradeError;
use crate::types::{PlaceWagerRequest, Wager};
use crate::AppState;

/// Default page size for listing endpoints.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Largest page a client may request from a listing endpoint.
pub const MAX_LIST_LIMIT: usize = 500;

/// Resolve a client-supplied page size. The cap keeps oversized requests
/// from turning into an unbounded table scan.
pub fn list_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
}

/// Create trades router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/place", post(place_wager))
        .route("/my-trades", get(my_trades))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Convert TradeError to an HTTP response.
impl IntoResponse for TradeError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            TradeError::InvalidWager(_) => (StatusCode::BAD_REQUEST, "INVALID_WAGER"),
            TradeError::UnknownInstrument(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_INSTRUMENT"),
            TradeError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS")
            }
            TradeError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
            TradeError::WagerNotFound(_) => (StatusCode::NOT_FOUND, "WAGER_NOT_FOUND"),
            TradeError::PlacementFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PLACEMENT_FAILED")
            }
            TradeError::ResolutionDeferred(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "RESOLUTION_DEFERRED")
            }
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct MyTradesQuery {
    pub limit: Option<usize>,
}

/// POST /api/trades/place
///
/// Place a wager on where the price will be when the duration runs out.
async fn place_wager(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<PlaceWagerRequest>,
) -> Result<Json<ApiResponse<Wager>>, TradeError> {
    let wager = state.trading.place_wager(&identity.user_id, &request)?;
    Ok(Json(ApiResponse { data: wager }))
}

/// GET /api/trades/my-trades
///
/// List the caller's wagers, most recent first.
async fn my_trades(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<MyTradesQuery>,
) -> Json<ApiResponse<Vec<Wager>>> {
    let wagers = state
        .trading
        .wagers_for_owner(&identity.user_id, list_limit(query.limit));
    Json(ApiResponse { data: wagers })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== Page Size Tests =====

    #[test]
    fn test_list_limit_defaults_and_clamps() {
        assert_eq!(list_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(list_limit(Some(10)), 10);
        assert_eq!(list_limit(Some(MAX_LIST_LIMIT)), MAX_LIST_LIMIT);
        assert_eq!(list_limit(Some(MAX_LIST_LIMIT + 1)), MAX_LIST_LIMIT);
        // A limit past i64 territory must not wrap into SQL as "no limit".
        assert_eq!(list_limit(Some(usize::MAX)), MAX_LIST_LIMIT);
    }

    // ===== ApiResponse Tests =====

    #[test]
    fn test_api_response_envelope() {
        let response = ApiResponse { data: vec![1, 2, 3] };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, "{\"data\":[1,2,3]}");
    }

    #[test]
    fn test_error_response_shape() {
        let response = ErrorResponse {
            error: "Invalid wager: bad amount".to_string(),
            code: "INVALID_WAGER".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\":\"Invalid wager: bad amount\""));
        assert!(json.contains("\"code\":\"INVALID_WAGER\""));
    }

    // ===== Error Mapping Tests =====

    #[test]
    fn test_trade_error_status_codes() {
        let cases = [
            (
                TradeError::InvalidWager("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                TradeError::UnknownInstrument("XYZ".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                TradeError::InsufficientFunds {
                    needed: 10.0,
                    available: 5.0,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                TradeError::AccountNotFound("u".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                TradeError::WagerNotFound("w".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                TradeError::PlacementFailed("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                TradeError::ResolutionDeferred("no price".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            let response = error.into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
