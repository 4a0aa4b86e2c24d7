pub mod admin;
pub mod auth;
pub mod health;
pub mod referral;
pub mod trades;
pub mod user;
pub mod wallet;

use crate::AppState;
use axum::Router;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/trades", trades::router())
        .nest("/api/user", user::router())
        .nest("/api/wallet", wallet::router())
        .nest("/api/referral", referral::router())
        .nest("/api/admin", admin::router())
}
