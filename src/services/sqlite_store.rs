//! SQLite persistence layer for accounts, wagers, and wallet bookkeeping.
//!
//! The store owns every balance mutation. The trade path goes through two
//! compound operations, each a single transaction:
//! - `place_wager`: balance check, escrow debit, wager insert
//! - `settle_wager`: status re-check, win/loss resolution, payout credit
//!
//! Collaborator surfaces (wallet, admin, referral) use their own methods on
//! the same serialized connection and never bypass the compound operations.

use crate::types::{
    Direction, KycStatus, ReferralEntry, ReferralStats, Role, Transaction, TxKind, TxStatus,
    UserAccount, Wager, WagerStatus, WagerWithOwner,
};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Ledger-level errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Wager not found: {0}")]
    WagerNotFound(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// Outcome of a settlement attempt.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// The wager reached a terminal state in this call.
    Settled(Wager),
    /// The wager was already terminal; nothing changed.
    AlreadyResolved(Wager),
}

/// SQLite store for accounts, wagers, transactions, and settings.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        store.seed_demo_data()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        store.seed_demo_data()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        // Users table. Authentication happens upstream, so no credentials.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE,
                phone TEXT UNIQUE,
                balance REAL NOT NULL DEFAULT 0,
                role TEXT NOT NULL DEFAULT 'user',
                kyc_status TEXT NOT NULL DEFAULT 'pending',
                referral_code TEXT UNIQUE NOT NULL,
                referred_by TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Wagers table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS wagers (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES users(id),
                instrument TEXT NOT NULL,
                amount REAL NOT NULL,
                direction TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                status TEXT NOT NULL DEFAULT 'pending',
                payout REAL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_wagers_owner ON wagers(owner_id, created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_wagers_status ON wagers(status)",
            [],
        )?;

        // Wallet transactions table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES users(id),
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_owner
             ON transactions(owner_id, created_at DESC)",
            [],
        )?;

        // Key/value settings table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Seed the default commission rate and the two demo accounts. Safe to
    /// run on every boot; existing rows are left untouched.
    fn seed_demo_data(&self) -> Result<(), LedgerError> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT OR IGNORE INTO settings (key, value) VALUES ('commission_rate', '10')",
                [],
            )?;
        }

        let now = chrono::Utc::now().timestamp_millis();
        let demo_accounts = [
            ("admin@punt.dev", "+1987654321", 5000.0, Role::Admin, "ADMIN1"),
            ("demo@punt.dev", "+1234567890", 1000.0, Role::User, "DEMO01"),
        ];
        for (email, phone, balance, role, code) in demo_accounts {
            self.create_account(&UserAccount {
                id: Uuid::new_v4().to_string(),
                email: Some(email.to_string()),
                phone: Some(phone.to_string()),
                balance,
                role,
                kyc_status: KycStatus::Approved,
                referral_code: code.to_string(),
                referred_by: None,
                created_at: now,
                updated_at: now,
            })?;
        }
        Ok(())
    }

    // ========== Account Methods ==========

    /// Insert an account. Rows that collide with an existing unique email,
    /// phone, or referral code are left untouched.
    pub fn create_account(&self, account: &UserAccount) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO users
             (id, email, phone, balance, role, kyc_status, referral_code, referred_by,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                account.id,
                account.email,
                account.phone,
                account.balance,
                account.role.as_str(),
                account.kyc_status.as_str(),
                account.referral_code,
                account.referred_by,
                account.created_at,
                account.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get an account by id. Absence is `Ok(None)`; a storage fault is an
    /// error, never a silent miss.
    pub fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        match conn.query_row(
            "SELECT id, email, phone, balance, role, kyc_status, referral_code, referred_by,
                    created_at, updated_at
             FROM users WHERE id = ?1",
            params![user_id],
            account_from_row,
        ) {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Current balance for an account.
    pub fn balance_of(&self, user_id: &str) -> Result<f64, LedgerError> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT balance FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        ) {
            Ok(balance) => Ok(balance),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(LedgerError::AccountNotFound(user_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All accounts, most recent first.
    pub fn all_users(&self) -> Vec<UserAccount> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT id, email, phone, balance, role, kyc_status, referral_code, referred_by,
                    created_at, updated_at
             FROM users ORDER BY created_at DESC, rowid DESC",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Error preparing users query: {}", e);
                return Vec::new();
            }
        };

        stmt.query_map([], account_from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// Overwrite an account's balance (admin override).
    pub fn set_balance(&self, user_id: &str, balance: f64) -> Result<UserAccount, LedgerError> {
        {
            let conn = self.conn.lock().unwrap();
            let now = chrono::Utc::now().timestamp_millis();
            let changed = conn.execute(
                "UPDATE users SET balance = ?1, updated_at = ?2 WHERE id = ?3",
                params![balance, now, user_id],
            )?;
            if changed == 0 {
                return Err(LedgerError::AccountNotFound(user_id.to_string()));
            }
        }
        self.get_account(user_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))
    }

    /// Update an account's KYC review status (admin action).
    pub fn set_kyc_status(
        &self,
        user_id: &str,
        status: KycStatus,
    ) -> Result<UserAccount, LedgerError> {
        {
            let conn = self.conn.lock().unwrap();
            let now = chrono::Utc::now().timestamp_millis();
            let changed = conn.execute(
                "UPDATE users SET kyc_status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, user_id],
            )?;
            if changed == 0 {
                return Err(LedgerError::AccountNotFound(user_id.to_string()));
            }
        }
        self.get_account(user_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))
    }

    // ========== Wager Methods ==========

    /// Escrow the stake and create the wager, atomically. The debit and the
    /// insert commit together or not at all.
    pub fn place_wager(&self, wager: &Wager) -> Result<(), LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let available: f64 = match tx.query_row(
            "SELECT balance FROM users WHERE id = ?1",
            params![wager.owner_id],
            |row| row.get(0),
        ) {
            Ok(balance) => balance,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(LedgerError::AccountNotFound(wager.owner_id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if available < wager.amount {
            return Err(LedgerError::InsufficientFunds {
                needed: wager.amount,
                available,
            });
        }

        tx.execute(
            "UPDATE users SET balance = balance - ?1, updated_at = ?2 WHERE id = ?3",
            params![wager.amount, wager.created_at, wager.owner_id],
        )?;
        tx.execute(
            "INSERT INTO wagers
             (id, owner_id, instrument, amount, direction, duration_seconds, entry_price,
              exit_price, status, payout, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                wager.id,
                wager.owner_id,
                wager.instrument,
                wager.amount,
                wager.direction.as_str(),
                wager.duration_seconds,
                wager.entry_price,
                wager.exit_price,
                wager.status.as_str(),
                wager.payout,
                wager.created_at,
                wager.expires_at,
            ],
        )?;
        tx.commit()?;

        debug!(
            "Escrowed {} for wager {} by {}",
            wager.amount, wager.id, wager.owner_id
        );
        Ok(())
    }

    /// Resolve a pending wager against `exit_price`, atomically. The status
    /// check, the terminal update, and the payout credit share one
    /// transaction, so a second caller sees `AlreadyResolved` and the credit
    /// can never apply twice.
    pub fn settle_wager(
        &self,
        wager_id: &str,
        exit_price: f64,
        payout_multiplier: f64,
    ) -> Result<SettleOutcome, LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut wager = match tx.query_row(
            "SELECT id, owner_id, instrument, amount, direction, duration_seconds, entry_price,
                    exit_price, status, payout, created_at, expires_at
             FROM wagers WHERE id = ?1",
            params![wager_id],
            wager_from_row,
        ) {
            Ok(wager) => wager,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(LedgerError::WagerNotFound(wager_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if wager.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyResolved(wager));
        }

        let won = wager.wins_at(exit_price);
        let payout = if won {
            wager.amount * payout_multiplier
        } else {
            0.0
        };
        let now = chrono::Utc::now().timestamp_millis();

        tx.execute(
            "UPDATE wagers SET status = ?1, exit_price = ?2, payout = ?3 WHERE id = ?4",
            params![
                if won { "won" } else { "lost" },
                exit_price,
                payout,
                wager_id
            ],
        )?;
        if won {
            tx.execute(
                "UPDATE users SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3",
                params![payout, now, wager.owner_id],
            )?;
        }
        tx.commit()?;

        wager.status = if won { WagerStatus::Won } else { WagerStatus::Lost };
        wager.exit_price = Some(exit_price);
        wager.payout = Some(payout);

        info!(
            "Wager {} settled as {} at exit price {}",
            wager_id, wager.status, exit_price
        );
        Ok(SettleOutcome::Settled(wager))
    }

    /// Get a wager by id. Absence is `Ok(None)`; a storage fault is an
    /// error, so the settle path can tell a missing row from a failed read.
    pub fn get_wager(&self, wager_id: &str) -> Result<Option<Wager>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        match conn.query_row(
            "SELECT id, owner_id, instrument, amount, direction, duration_seconds, entry_price,
                    exit_price, status, payout, created_at, expires_at
             FROM wagers WHERE id = ?1",
            params![wager_id],
            wager_from_row,
        ) {
            Ok(wager) => Ok(Some(wager)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// An owner's wagers, most recent first.
    pub fn wagers_for_owner(&self, owner_id: &str, limit: usize) -> Vec<Wager> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT id, owner_id, instrument, amount, direction, duration_seconds, entry_price,
                    exit_price, status, payout, created_at, expires_at
             FROM wagers WHERE owner_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Error preparing wager query: {}", e);
                return Vec::new();
            }
        };

        stmt.query_map(params![owner_id, sql_limit(limit)], wager_from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// All wagers joined with owner contact info, most recent first
    /// (admin review).
    pub fn all_wagers(&self, limit: usize) -> Vec<WagerWithOwner> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT w.id, w.owner_id, w.instrument, w.amount, w.direction, w.duration_seconds,
                    w.entry_price, w.exit_price, w.status, w.payout, w.created_at, w.expires_at,
                    u.email, u.phone
             FROM wagers w
             LEFT JOIN users u ON u.id = w.owner_id
             ORDER BY w.created_at DESC, w.rowid DESC
             LIMIT ?1",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Error preparing admin wager query: {}", e);
                return Vec::new();
            }
        };

        stmt.query_map(params![sql_limit(limit)], |row| {
            Ok(WagerWithOwner {
                wager: wager_from_row(row)?,
                owner_email: row.get(12)?,
                owner_phone: row.get(13)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    // ========== Wallet Methods ==========

    /// Credit a demo deposit. The transaction record completes immediately.
    pub fn deposit(&self, owner_id: &str, amount: f64) -> Result<Transaction, LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if let Err(e) = tx.query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            params![owner_id],
            |row| row.get::<_, i64>(0),
        ) {
            return match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Err(LedgerError::AccountNotFound(owner_id.to_string()))
                }
                e => Err(e.into()),
            };
        }

        let record = Transaction::new(
            owner_id,
            TxKind::Deposit,
            amount,
            TxStatus::Completed,
            chrono::Utc::now().timestamp_millis(),
        );
        tx.execute(
            "INSERT INTO transactions (id, owner_id, kind, amount, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.owner_id,
                record.kind.as_str(),
                record.amount,
                record.status.as_str(),
                record.created_at,
            ],
        )?;
        tx.execute(
            "UPDATE users SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3",
            params![amount, record.created_at, owner_id],
        )?;
        tx.commit()?;

        debug!("Deposited {} for {}", amount, owner_id);
        Ok(record)
    }

    /// Debit a withdrawal. The transaction record stays pending for manual
    /// review; the balance moves immediately so it cannot be re-spent.
    pub fn withdraw(&self, owner_id: &str, amount: f64) -> Result<Transaction, LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let available: f64 = match tx.query_row(
            "SELECT balance FROM users WHERE id = ?1",
            params![owner_id],
            |row| row.get(0),
        ) {
            Ok(balance) => balance,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(LedgerError::AccountNotFound(owner_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        let record = Transaction::new(
            owner_id,
            TxKind::Withdraw,
            amount,
            TxStatus::Pending,
            chrono::Utc::now().timestamp_millis(),
        );
        tx.execute(
            "INSERT INTO transactions (id, owner_id, kind, amount, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.owner_id,
                record.kind.as_str(),
                record.amount,
                record.status.as_str(),
                record.created_at,
            ],
        )?;
        tx.execute(
            "UPDATE users SET balance = balance - ?1, updated_at = ?2 WHERE id = ?3",
            params![amount, record.created_at, owner_id],
        )?;
        tx.commit()?;

        debug!("Withdrawal of {} opened for {}", amount, owner_id);
        Ok(record)
    }

    /// An owner's wallet transactions, most recent first.
    pub fn transactions_for_owner(&self, owner_id: &str, limit: usize) -> Vec<Transaction> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT id, owner_id, kind, amount, status, created_at
             FROM transactions WHERE owner_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Error preparing transaction query: {}", e);
                return Vec::new();
            }
        };

        stmt.query_map(params![owner_id, sql_limit(limit)], transaction_from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    // ========== Settings Methods ==========

    /// Read a setting value.
    pub fn get_setting(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        ) {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                error!("Error reading setting {}: {}", key, e);
                None
            }
        }
    }

    /// Write a setting value.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Referral commission rate in percent.
    pub fn commission_rate(&self) -> f64 {
        self.get_setting("commission_rate")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10.0)
    }

    // ========== Referral Methods ==========

    /// Referral rollup for an account: every account that joined with this
    /// account's code, with commission earned from their winning wagers.
    pub fn referral_stats(&self, user_id: &str) -> Result<ReferralStats, LedgerError> {
        let account = self
            .get_account(user_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        let rate = self.commission_rate();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.email, u.phone, u.created_at,
                    COALESCE(SUM(CASE WHEN w.status = 'won' THEN w.payout ELSE 0 END), 0)
             FROM users u
             LEFT JOIN wagers w ON w.owner_id = u.id
             WHERE u.referred_by = ?1
             GROUP BY u.id
             ORDER BY u.created_at DESC",
        )?;

        let referrals: Vec<ReferralEntry> = stmt
            .query_map(params![account.referral_code], |row| {
                let won_payout: f64 = row.get(4)?;
                Ok(ReferralEntry {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    phone: row.get(2)?,
                    joined_at: row.get(3)?,
                    commission: won_payout * rate / 100.0,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        let total_earnings = referrals.iter().map(|r| r.commission).sum();
        Ok(ReferralStats {
            referral_code: account.referral_code,
            total_referrals: referrals.len(),
            total_earnings,
            referrals,
        })
    }
}

/// Saturate a caller-supplied row count into a SQL LIMIT operand. A plain
/// `as i64` cast wraps huge values negative, which SQLite reads as unlimited.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Map a users row in canonical column order.
fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserAccount> {
    let role: String = row.get(4)?;
    let kyc_status: String = row.get(5)?;
    Ok(UserAccount {
        id: row.get(0)?,
        email: row.get(1)?,
        phone: row.get(2)?,
        balance: row.get(3)?,
        role: Role::from_str(&role).unwrap_or(Role::User),
        kyc_status: KycStatus::from_str(&kyc_status).unwrap_or(KycStatus::Pending),
        referral_code: row.get(6)?,
        referred_by: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Map a wagers row in canonical column order.
fn wager_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Wager> {
    let direction: String = row.get(4)?;
    let status: String = row.get(8)?;
    Ok(Wager {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        instrument: row.get(2)?,
        amount: row.get(3)?,
        direction: Direction::from_str(&direction).unwrap_or(Direction::Up),
        duration_seconds: row.get(5)?,
        entry_price: row.get(6)?,
        exit_price: row.get(7)?,
        status: WagerStatus::from_str(&status).unwrap_or(WagerStatus::Pending),
        payout: row.get(9)?,
        created_at: row.get(10)?,
        expires_at: row.get(11)?,
    })
}

/// Map a transactions row in canonical column order.
fn transaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let kind: String = row.get(2)?;
    let status: String = row.get(4)?;
    Ok(Transaction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        kind: TxKind::from_str(&kind).unwrap_or(TxKind::Deposit),
        amount: row.get(3)?,
        status: TxStatus::from_str(&status).unwrap_or(TxStatus::Pending),
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account(id: &str, balance: f64) -> UserAccount {
        UserAccount {
            id: id.to_string(),
            email: None,
            phone: None,
            balance,
            role: Role::User,
            kyc_status: KycStatus::Pending,
            referral_code: format!("REF-{}", id),
            referred_by: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    fn pending_wager(owner: &str, amount: f64, direction: Direction, entry: f64) -> Wager {
        Wager::new(owner, "USD", amount, direction, 60, entry, 1_700_000_000_000)
    }

    #[test]
    fn test_place_wager_escrows_stake() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        let wager = pending_wager("u1", 40.0, Direction::Up, 1.2345);
        store.place_wager(&wager).unwrap();

        assert_eq!(store.balance_of("u1").unwrap(), 60.0);
        let stored = store.get_wager(&wager.id).unwrap().unwrap();
        assert_eq!(stored.status, WagerStatus::Pending);
        assert_eq!(stored.amount, 40.0);
        assert_eq!(stored.entry_price, 1.2345);
    }

    #[test]
    fn test_place_wager_insufficient_funds_changes_nothing() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 30.0)).unwrap();

        let wager = pending_wager("u1", 40.0, Direction::Up, 1.2345);
        let err = store.place_wager(&wager).unwrap_err();

        match err {
            LedgerError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, 40.0);
                assert_eq!(available, 30.0);
            }
            other => panic!("Expected InsufficientFunds, got {:?}", other),
        }
        assert_eq!(store.balance_of("u1").unwrap(), 30.0);
        assert!(store.get_wager(&wager.id).unwrap().is_none());
    }

    #[test]
    fn test_place_wager_unknown_account() {
        let store = SqliteStore::new_in_memory().unwrap();
        let wager = pending_wager("ghost", 40.0, Direction::Up, 1.2345);

        assert!(matches!(
            store.place_wager(&wager),
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_settle_win_credits_payout() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        let wager = pending_wager("u1", 50.0, Direction::Up, 1.2300);
        store.place_wager(&wager).unwrap();
        assert_eq!(store.balance_of("u1").unwrap(), 50.0);

        let outcome = store.settle_wager(&wager.id, 1.2400, 1.8).unwrap();
        let settled = match outcome {
            SettleOutcome::Settled(w) => w,
            SettleOutcome::AlreadyResolved(_) => panic!("Expected first settlement"),
        };

        assert_eq!(settled.status, WagerStatus::Won);
        assert_eq!(settled.exit_price, Some(1.2400));
        assert_eq!(settled.payout, Some(90.0));
        assert_eq!(store.balance_of("u1").unwrap(), 140.0);
    }

    #[test]
    fn test_settle_loss_credits_nothing() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        let wager = pending_wager("u1", 50.0, Direction::Up, 1.2300);
        store.place_wager(&wager).unwrap();

        let outcome = store.settle_wager(&wager.id, 1.2200, 1.8).unwrap();
        let settled = match outcome {
            SettleOutcome::Settled(w) => w,
            SettleOutcome::AlreadyResolved(_) => panic!("Expected first settlement"),
        };

        assert_eq!(settled.status, WagerStatus::Lost);
        assert_eq!(settled.payout, Some(0.0));
        assert_eq!(store.balance_of("u1").unwrap(), 50.0);
    }

    #[test]
    fn test_settle_exact_tie_loses_both_directions() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        for direction in [Direction::Up, Direction::Down] {
            let wager = pending_wager("u1", 10.0, direction, 1.2345);
            store.place_wager(&wager).unwrap();
            let outcome = store.settle_wager(&wager.id, 1.2345, 1.8).unwrap();
            match outcome {
                SettleOutcome::Settled(w) => assert_eq!(w.status, WagerStatus::Lost),
                SettleOutcome::AlreadyResolved(_) => panic!("Expected first settlement"),
            }
        }
        assert_eq!(store.balance_of("u1").unwrap(), 80.0);
    }

    #[test]
    fn test_settle_twice_credits_once() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        let wager = pending_wager("u1", 50.0, Direction::Up, 1.2300);
        store.place_wager(&wager).unwrap();

        store.settle_wager(&wager.id, 1.2400, 1.8).unwrap();
        let second = store.settle_wager(&wager.id, 1.2400, 1.8).unwrap();

        assert!(matches!(second, SettleOutcome::AlreadyResolved(_)));
        assert_eq!(store.balance_of("u1").unwrap(), 140.0);
    }

    #[test]
    fn test_settle_unknown_wager() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(matches!(
            store.settle_wager("nope", 1.23, 1.8),
            Err(LedgerError::WagerNotFound(_))
        ));
    }

    #[test]
    fn test_wagers_for_owner_most_recent_first() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        for i in 0..3 {
            let mut wager = pending_wager("u1", 10.0, Direction::Up, 1.23);
            wager.created_at = 1_700_000_000_000 + i * 1000;
            store.place_wager(&wager).unwrap();
        }

        let wagers = store.wagers_for_owner("u1", 50);
        assert_eq!(wagers.len(), 3);
        assert!(wagers[0].created_at >= wagers[1].created_at);
        assert!(wagers[1].created_at >= wagers[2].created_at);

        let limited = store.wagers_for_owner("u1", 2);
        assert_eq!(limited.len(), 2);

        // A huge count saturates into the SQL LIMIT instead of wrapping.
        let all = store.wagers_for_owner("u1", usize::MAX);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        let deposit = store.deposit("u1", 25.0).unwrap();
        assert_eq!(deposit.kind, TxKind::Deposit);
        assert_eq!(deposit.status, TxStatus::Completed);
        assert_eq!(store.balance_of("u1").unwrap(), 125.0);

        let withdrawal = store.withdraw("u1", 75.0).unwrap();
        assert_eq!(withdrawal.kind, TxKind::Withdraw);
        assert_eq!(withdrawal.status, TxStatus::Pending);
        assert_eq!(store.balance_of("u1").unwrap(), 50.0);

        let history = store.transactions_for_owner("u1", 50);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_withdraw_insufficient_funds() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 10.0)).unwrap();

        assert!(matches!(
            store.withdraw("u1", 20.0),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(store.balance_of("u1").unwrap(), 10.0);
        assert!(store.transactions_for_owner("u1", 50).is_empty());
    }

    #[test]
    fn test_demo_seed_is_idempotent() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert_eq!(store.all_users().len(), 2);

        store.seed_demo_data().unwrap();
        assert_eq!(store.all_users().len(), 2);
        assert_eq!(store.get_setting("commission_rate").as_deref(), Some("10"));
    }

    #[test]
    fn test_settings_roundtrip() {
        let store = SqliteStore::new_in_memory().unwrap();

        assert_eq!(store.commission_rate(), 10.0);
        store.set_setting("commission_rate", "12.5").unwrap();
        assert_eq!(store.commission_rate(), 12.5);
    }

    #[test]
    fn test_referral_stats_commission() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("ref", 100.0)).unwrap();

        let mut friend = test_account("friend", 200.0);
        friend.referred_by = Some("REF-ref".to_string());
        store.create_account(&friend).unwrap();

        // One win of 100 paying 180, one loss.
        let win = pending_wager("friend", 100.0, Direction::Up, 1.2300);
        store.place_wager(&win).unwrap();
        store.settle_wager(&win.id, 1.2400, 1.8).unwrap();

        let loss = pending_wager("friend", 50.0, Direction::Down, 1.2300);
        store.place_wager(&loss).unwrap();
        store.settle_wager(&loss.id, 1.2400, 1.8).unwrap();

        let stats = store.referral_stats("ref").unwrap();
        assert_eq!(stats.total_referrals, 1);
        // 10% of the 180 won payout.
        assert!((stats.referrals[0].commission - 18.0).abs() < 1e-9);
        assert!((stats.total_earnings - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_admin_wager_review_includes_owner_contact() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut account = test_account("u1", 100.0);
        account.email = Some("u1@punt.dev".to_string());
        store.create_account(&account).unwrap();

        let wager = pending_wager("u1", 10.0, Direction::Up, 1.23);
        store.place_wager(&wager).unwrap();

        let rows = store.all_wagers(50);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].wager.id, wager.id);
        assert_eq!(rows[0].owner_email.as_deref(), Some("u1@punt.dev"));
    }

    #[test]
    fn test_set_balance_and_kyc() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.create_account(&test_account("u1", 100.0)).unwrap();

        let updated = store.set_balance("u1", 250.0).unwrap();
        assert_eq!(updated.balance, 250.0);

        let updated = store.set_kyc_status("u1", KycStatus::Approved).unwrap();
        assert_eq!(updated.kyc_status, KycStatus::Approved);

        assert!(matches!(
            store.set_balance("ghost", 1.0),
            Err(LedgerError::AccountNotFound(_))
        ));
    }
}
