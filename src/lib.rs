//! Demo binary-options trading server.
//!
//! A simulated FX price feed drives short-lived up/down wagers: users stake
//! demo funds on the direction of the next price move, a scheduler resolves
//! each wager when its duration runs out, and winners are credited at a
//! fixed payout multiplier. State lives in SQLite; prices and settlements
//! stream to clients over WebSocket.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod websocket;

use std::sync::Arc;

use services::{SqliteStore, TradingService};
use websocket::RoomManager;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Account, wager, and wallet persistence.
    pub store: Arc<SqliteStore>,
    /// Wager placement and settlement coordinator.
    pub trading: Arc<TradingService>,
    /// WebSocket room registry.
    pub room_manager: Arc<RoomManager>,
}
