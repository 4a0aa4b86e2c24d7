//! Wager Types
//!
//! Types for the binary up/down wager lifecycle: placement requests,
//! stored wagers, and settlement outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Predicted direction of the price at expiry relative to entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a wager. Transitions only from `Pending` to a
/// terminal state, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
}

impl WagerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WagerStatus::Won | WagerStatus::Lost)
    }

    pub fn as_str(&self) -> &str {
        match self {
            WagerStatus::Pending => "pending",
            WagerStatus::Won => "won",
            WagerStatus::Lost => "lost",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WagerStatus::Pending),
            "won" => Some(WagerStatus::Won),
            "lost" => Some(WagerStatus::Lost),
            _ => None,
        }
    }
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fixed-payout up/down wager. The stake is deducted at placement and
/// held until settlement; a win credits stake plus profit in one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wager {
    pub id: String,
    pub owner_id: String,
    pub instrument: String,
    pub amount: f64,
    pub direction: Direction,
    pub duration_seconds: i64,
    /// Price snapshot captured at placement.
    pub entry_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    pub status: WagerStatus,
    /// Total credited on a win (stake times payout multiplier).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<f64>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Wager {
    /// Create a pending wager placed at `now_ms` against `entry_price`.
    pub fn new(
        owner_id: impl Into<String>,
        instrument: impl Into<String>,
        amount: f64,
        direction: Direction,
        duration_seconds: i64,
        entry_price: f64,
        now_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            instrument: instrument.into(),
            amount,
            direction,
            duration_seconds,
            entry_price,
            exit_price: None,
            status: WagerStatus::Pending,
            payout: None,
            created_at: now_ms,
            expires_at: now_ms + duration_seconds * 1000,
        }
    }

    /// Whether an exit at `exit_price` wins this wager. An exit exactly
    /// equal to the entry price loses for both directions.
    pub fn wins_at(&self, exit_price: f64) -> bool {
        match self.direction {
            Direction::Up => exit_price > self.entry_price,
            Direction::Down => exit_price < self.entry_price,
        }
    }
}

/// Request body for placing a wager.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceWagerRequest {
    pub amount: f64,
    pub direction: Direction,
    pub duration_seconds: i64,
    /// Instrument code; defaults to the first configured instrument.
    #[serde(default)]
    pub instrument: Option<String>,
}

/// Admin review row: a wager joined with its owner's contact info.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerWithOwner {
    pub wager: Wager,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_phone: Option<String>,
}
