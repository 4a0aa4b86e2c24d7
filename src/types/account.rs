//! Account Types
//!
//! Stored user accounts, wallet ledger entries, and referral rollups.
//! Authentication happens upstream of this service; accounts carry no
//! credentials, only identity and balance state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account role used for authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// KYC review status. Informational only; no verification pipeline runs here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &str {
        match self {
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(KycStatus::Pending),
            "approved" => Some(KycStatus::Approved),
            "rejected" => Some(KycStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub balance: f64,
    pub role: Role,
    pub kyc_status: KycStatus,
    pub referral_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Public view of an account returned by the profile endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub balance: f64,
    pub kyc_status: KycStatus,
    pub referral_code: String,
}

impl From<UserAccount> for Profile {
    fn from(account: UserAccount) -> Self {
        Self {
            id: account.id,
            email: account.email,
            phone: account.phone,
            balance: account.balance,
            kyc_status: account.kyc_status,
            referral_code: account.referral_code,
        }
    }
}

/// Wallet ledger entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdraw,
}

impl TxKind {
    pub fn as_str(&self) -> &str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TxKind::Deposit),
            "withdraw" => Some(TxKind::Withdraw),
            _ => None,
        }
    }
}

/// Wallet ledger entry status. Deposits complete immediately in demo
/// mode; withdrawals stay pending for manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
}

impl TxStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TxStatus::Pending),
            "completed" => Some(TxStatus::Completed),
            _ => None,
        }
    }
}

/// A wallet ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub owner_id: String,
    pub kind: TxKind,
    pub amount: f64,
    pub status: TxStatus,
    pub created_at: i64,
}

impl Transaction {
    pub fn new(owner_id: impl Into<String>, kind: TxKind, amount: f64, status: TxStatus, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            kind,
            amount,
            status,
            created_at: now_ms,
        }
    }
}

/// Rollup of one referred account's settled activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub joined_at: i64,
    /// Commission earned from this referral's winning wagers.
    pub commission: f64,
}

/// Referral dashboard payload for one account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub referral_code: String,
    pub total_referrals: usize,
    pub total_earnings: f64,
    pub referrals: Vec<ReferralEntry>,
}
