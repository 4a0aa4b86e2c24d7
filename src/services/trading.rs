//! Trading Service
//!
//! Coordinates the wager lifecycle between the price engine, the ledger,
//! and the settlement scheduler.
//!
//! Placement: validate the request, sample the entry price, escrow the
//! stake and insert the wager in one ledger transaction, then register the
//! expiry with the scheduler. Settlement: sample the exit price, resolve
//! win/loss inside the ledger transaction, and broadcast the terminal wager
//! to subscribers.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::services::{
    Clock, LedgerError, PriceEngine, SettleOutcome, SettlementScheduler, SqliteStore, SystemClock,
};
use crate::types::{PlaceWagerRequest, ServerMessage, Wager, WagerSettledData, WagerStatus};
use crate::websocket::RoomManager;

/// Trade-path errors.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Invalid wager: {0}")]
    InvalidWager(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Wager not found: {0}")]
    WagerNotFound(String),

    #[error("Wager placement failed: {0}")]
    PlacementFailed(String),

    #[error("Resolution deferred: {0}")]
    ResolutionDeferred(String),
}

impl From<LedgerError> for TradeError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountNotFound(id) => TradeError::AccountNotFound(id),
            LedgerError::WagerNotFound(id) => TradeError::WagerNotFound(id),
            LedgerError::InsufficientFunds { needed, available } => {
                TradeError::InsufficientFunds { needed, available }
            }
            LedgerError::Database(e) => TradeError::PlacementFailed(e.to_string()),
        }
    }
}

/// Wager lifecycle coordinator.
pub struct TradingService {
    /// Ledger holding accounts, wagers, and balances.
    store: Arc<SqliteStore>,
    /// Price engine sampled for entry and exit prices.
    engine: Arc<PriceEngine>,
    /// Scheduler registered on every successful placement.
    scheduler: Arc<SettlementScheduler>,
    /// Multiplier applied to the stake of a winning wager.
    payout_multiplier: f64,
    /// Upper bound on accepted wager durations.
    max_wager_duration_secs: i64,
    /// Room manager for WebSocket broadcasts (optional for testing).
    room_manager: Option<Arc<RoomManager>>,
    /// Clock for wager timestamps.
    clock: Arc<dyn Clock>,
}

impl TradingService {
    /// Create a new trading service on the system clock.
    pub fn new(
        store: Arc<SqliteStore>,
        engine: Arc<PriceEngine>,
        scheduler: Arc<SettlementScheduler>,
        config: &Config,
    ) -> Self {
        Self::with_clock(store, engine, scheduler, config, Arc::new(SystemClock))
    }

    /// Create a new trading service with a custom clock (for testing).
    pub fn with_clock(
        store: Arc<SqliteStore>,
        engine: Arc<PriceEngine>,
        scheduler: Arc<SettlementScheduler>,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine,
            scheduler,
            payout_multiplier: config.payout_multiplier,
            max_wager_duration_secs: config.max_wager_duration_secs,
            room_manager: None,
            clock,
        }
    }

    /// Set room manager for WebSocket broadcasts.
    pub fn set_room_manager(&mut self, room_manager: Arc<RoomManager>) {
        self.room_manager = Some(room_manager);
    }

    /// Validate and place a wager for `owner_id`. On success the stake is
    /// escrowed and the expiry is queued for settlement.
    pub fn place_wager(
        &self,
        owner_id: &str,
        request: &PlaceWagerRequest,
    ) -> Result<Wager, TradeError> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(TradeError::InvalidWager(format!(
                "amount must be a positive number, got {}",
                request.amount
            )));
        }
        if request.duration_seconds <= 0 {
            return Err(TradeError::InvalidWager(format!(
                "duration must be positive, got {}s",
                request.duration_seconds
            )));
        }
        if request.duration_seconds > self.max_wager_duration_secs {
            return Err(TradeError::InvalidWager(format!(
                "duration {}s exceeds maximum {}s",
                request.duration_seconds, self.max_wager_duration_secs
            )));
        }

        let instrument = match request.instrument.as_deref() {
            Some(code) => code,
            None => self
                .engine
                .instruments()
                .first()
                .map(|i| i.code.as_str())
                .unwrap_or("USD"),
        };
        let entry_price = self
            .engine
            .current_price(instrument)
            .ok_or_else(|| TradeError::UnknownInstrument(instrument.to_string()))?;

        let wager = Wager::new(
            owner_id,
            instrument,
            request.amount,
            request.direction,
            request.duration_seconds,
            entry_price,
            self.clock.now_ms(),
        );
        self.store.place_wager(&wager)?;
        self.scheduler.schedule(wager.id.as_str(), wager.expires_at);

        info!(
            "Wager {} placed: {} {} on {} for {}s at entry {}",
            wager.id,
            wager.amount,
            wager.direction,
            wager.instrument,
            wager.duration_seconds,
            wager.entry_price
        );
        Ok(wager)
    }

    /// Resolve a wager against the current derived price. Terminal wagers
    /// come back as `AlreadyResolved` without touching the ledger. A missing
    /// quote or a storage fault defers resolution so the scheduler retries.
    pub fn settle_wager(&self, wager_id: &str) -> Result<SettleOutcome, TradeError> {
        let wager = match self.store.get_wager(wager_id) {
            Ok(Some(wager)) => wager,
            Ok(None) => return Err(TradeError::WagerNotFound(wager_id.to_string())),
            Err(e) => return Err(TradeError::ResolutionDeferred(e.to_string())),
        };

        if wager.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyResolved(wager));
        }

        let exit_price = self.engine.current_price(&wager.instrument).ok_or_else(|| {
            TradeError::ResolutionDeferred(format!("no price for {}", wager.instrument))
        })?;

        let outcome = self
            .store
            .settle_wager(wager_id, exit_price, self.payout_multiplier)
            .map_err(|e| match e {
                LedgerError::WagerNotFound(id) => TradeError::WagerNotFound(id),
                e => TradeError::ResolutionDeferred(e.to_string()),
            })?;

        if let SettleOutcome::Settled(ref settled) = outcome {
            info!(
                "Wager {} resolved as {} at exit {}",
                settled.id, settled.status, exit_price
            );
            self.broadcast_settlement(settled);
        }
        Ok(outcome)
    }

    /// An owner's wagers, most recent first.
    pub fn wagers_for_owner(&self, owner_id: &str, limit: usize) -> Vec<Wager> {
        self.store.wagers_for_owner(owner_id, limit)
    }

    /// Broadcast a settled wager to the owner's wager room.
    fn broadcast_settlement(&self, wager: &Wager) {
        if let Some(ref room_manager) = self.room_manager {
            let won = wager.status == WagerStatus::Won;
            let data = WagerSettledData {
                wager: wager.clone(),
                won,
                payout: if won { wager.payout } else { None },
                timestamp: self.clock.now_ms(),
            };
            let msg = ServerMessage::WagerSettled { data };
            if let Ok(json) = serde_json::to_string(&msg) {
                room_manager.broadcast_wagers(&wager.owner_id, &json);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ManualClock;
    use crate::types::{Direction, KycStatus, Role, UserAccount};

    const START_MS: i64 = 1_700_000_000_000;

    struct Stack {
        store: Arc<SqliteStore>,
        scheduler: Arc<SettlementScheduler>,
        trading: TradingService,
    }

    fn stack() -> Stack {
        let config = Config::default();
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let engine = PriceEngine::with_seed(config.instruments.clone(), config.feed.clone(), 7);
        let clock = Arc::new(ManualClock::new(START_MS));
        let scheduler = SettlementScheduler::with_clock(clock.clone());
        let trading = TradingService::with_clock(
            store.clone(),
            engine,
            scheduler.clone(),
            &config,
            clock,
        );
        Stack {
            store,
            scheduler,
            trading,
        }
    }

    fn fund_account(store: &SqliteStore, id: &str, balance: f64) {
        store
            .create_account(&UserAccount {
                id: id.to_string(),
                email: None,
                phone: None,
                balance,
                role: Role::User,
                kyc_status: KycStatus::Approved,
                referral_code: format!("REF-{}", id),
                referred_by: None,
                created_at: START_MS,
                updated_at: START_MS,
            })
            .unwrap();
    }

    fn request(amount: f64, duration_seconds: i64) -> PlaceWagerRequest {
        PlaceWagerRequest {
            amount,
            direction: Direction::Up,
            duration_seconds,
            instrument: None,
        }
    }

    // ===== Placement Validation =====

    #[test]
    fn test_place_rejects_bad_amounts() {
        let s = stack();
        fund_account(&s.store, "u1", 100.0);

        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = s.trading.place_wager("u1", &request(amount, 60)).unwrap_err();
            assert!(matches!(err, TradeError::InvalidWager(_)), "amount {}", amount);
        }
        assert_eq!(s.store.balance_of("u1").unwrap(), 100.0);
        assert_eq!(s.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_place_rejects_bad_durations() {
        let s = stack();
        fund_account(&s.store, "u1", 100.0);

        for duration in [0, -60, 86_401] {
            let err = s.trading.place_wager("u1", &request(10.0, duration)).unwrap_err();
            assert!(matches!(err, TradeError::InvalidWager(_)), "duration {}", duration);
        }
    }

    #[test]
    fn test_place_rejects_unknown_instrument() {
        let s = stack();
        fund_account(&s.store, "u1", 100.0);

        let mut req = request(10.0, 60);
        req.instrument = Some("XYZ".to_string());
        assert!(matches!(
            s.trading.place_wager("u1", &req),
            Err(TradeError::UnknownInstrument(_))
        ));
    }

    #[test]
    fn test_place_defaults_to_first_instrument() {
        let s = stack();
        fund_account(&s.store, "u1", 100.0);

        let wager = s.trading.place_wager("u1", &request(10.0, 60)).unwrap();
        assert_eq!(wager.instrument, "USD");
    }

    // ===== Placement Effects =====

    #[test]
    fn test_place_escrows_and_schedules() {
        let s = stack();
        fund_account(&s.store, "u1", 100.0);

        let wager = s.trading.place_wager("u1", &request(40.0, 120)).unwrap();

        assert_eq!(wager.created_at, START_MS);
        assert_eq!(wager.expires_at, START_MS + 120_000);
        assert_eq!(s.store.balance_of("u1").unwrap(), 60.0);
        assert_eq!(s.scheduler.pending_count(), 1);
        assert_eq!(s.scheduler.next_due_at(), Some(wager.expires_at));
    }

    #[test]
    fn test_place_insufficient_funds_leaves_no_trace() {
        let s = stack();
        fund_account(&s.store, "u1", 20.0);

        let err = s.trading.place_wager("u1", &request(40.0, 60)).unwrap_err();
        match err {
            TradeError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, 40.0);
                assert_eq!(available, 20.0);
            }
            other => panic!("Expected InsufficientFunds, got {:?}", other),
        }
        assert_eq!(s.store.balance_of("u1").unwrap(), 20.0);
        assert_eq!(s.scheduler.pending_count(), 0);
        assert!(s.trading.wagers_for_owner("u1", 50).is_empty());
    }

    #[test]
    fn test_place_unknown_account() {
        let s = stack();
        assert!(matches!(
            s.trading.place_wager("ghost", &request(10.0, 60)),
            Err(TradeError::AccountNotFound(_))
        ));
    }

    // ===== Settlement Entry Points =====

    #[test]
    fn test_settle_unknown_wager_id_errors() {
        let s = stack();
        assert!(matches!(
            s.trading.settle_wager("nope"),
            Err(TradeError::WagerNotFound(_))
        ));
    }

    #[test]
    fn test_settle_twice_reports_already_resolved() {
        let s = stack();
        fund_account(&s.store, "u1", 100.0);

        let wager = s.trading.place_wager("u1", &request(10.0, 60)).unwrap();

        let first = s.trading.settle_wager(&wager.id).unwrap();
        assert!(matches!(first, SettleOutcome::Settled(_)));

        let second = s.trading.settle_wager(&wager.id).unwrap();
        let resolved = match second {
            SettleOutcome::AlreadyResolved(w) => w,
            SettleOutcome::Settled(_) => panic!("Expected AlreadyResolved"),
        };
        assert!(resolved.status.is_terminal());
    }

    #[test]
    fn test_settle_without_movement_is_a_loss() {
        // No tick between entry and exit, so exit == entry; ties lose.
        let s = stack();
        fund_account(&s.store, "u1", 100.0);

        let wager = s.trading.place_wager("u1", &request(30.0, 60)).unwrap();
        let outcome = s.trading.settle_wager(&wager.id).unwrap();

        match outcome {
            SettleOutcome::Settled(w) => {
                assert_eq!(w.status, WagerStatus::Lost);
                assert_eq!(w.payout, Some(0.0));
            }
            SettleOutcome::AlreadyResolved(_) => panic!("Expected first settlement"),
        }
        assert_eq!(s.store.balance_of("u1").unwrap(), 70.0);
    }
}
