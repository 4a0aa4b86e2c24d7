use super::{Candle, PriceTick, Wager};
use serde::{Deserialize, Serialize};

/// Incoming WebSocket message from client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        instruments: Vec<String>,
    },
    Unsubscribe {
        instruments: Vec<String>,
    },
    /// Subscribe to settlement notifications for a user's wagers
    SubscribeWagers {
        user_id: String,
    },
    /// Unsubscribe from settlement notifications
    UnsubscribeWagers {
        user_id: String,
    },
}

/// Outgoing WebSocket message to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PriceUpdate {
        data: PriceTick,
    },
    CandleUpdate {
        data: Candle,
    },
    /// A wager owned by a subscribed user reached a terminal state
    WagerSettled {
        data: WagerSettledData,
    },
    Subscribed {
        instruments: Vec<String>,
    },
    Unsubscribed {
        instruments: Vec<String>,
    },
    /// Confirmation of wager subscription
    WagersSubscribed {
        user_id: String,
    },
    /// Confirmation of wager unsubscription
    WagersUnsubscribed {
        user_id: String,
    },
    Error {
        error: String,
    },
}

/// Settlement notification payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerSettledData {
    /// The settled wager, including exit price and final status.
    pub wager: Wager,
    pub won: bool,
    /// Amount credited back to the owner (None on a loss).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<f64>,
    pub timestamp: i64,
}
