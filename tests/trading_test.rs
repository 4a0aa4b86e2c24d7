//! End-to-end tests for the wager lifecycle
//!
//! Tests cover:
//! - Place through scheduled settlement against a live feed
//! - Wager history ordering and limits
//! - Settlement notifications on the owner's wager feed
//! - Winnings funding subsequent wagers

use std::sync::Arc;

use punt::config::Config;
use punt::services::{
    Clock, ManualClock, PriceEngine, SettlementScheduler, SqliteStore, TradingService,
};
use punt::types::{
    Direction, KycStatus, PlaceWagerRequest, Role, UserAccount, Wager, WagerStatus,
};
use punt::websocket::RoomManager;
use tokio::sync::mpsc;

const START_MS: i64 = 1_700_000_000_000;

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<SqliteStore>,
    engine: Arc<PriceEngine>,
    scheduler: Arc<SettlementScheduler>,
    room_manager: Arc<RoomManager>,
    trading: TradingService,
}

impl Harness {
    fn new(seed: u64) -> Self {
        let config = Config::default();
        let clock = Arc::new(ManualClock::new(START_MS));
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let engine = PriceEngine::with_seed(config.instruments.clone(), config.feed.clone(), seed);
        let scheduler = SettlementScheduler::with_clock(clock.clone());
        let room_manager = RoomManager::new();
        let mut trading = TradingService::with_clock(
            store.clone(),
            engine.clone(),
            scheduler.clone(),
            &config,
            clock.clone(),
        );
        trading.set_room_manager(room_manager.clone());
        Self {
            clock,
            store,
            engine,
            scheduler,
            room_manager,
            trading,
        }
    }

    fn fund(&self, id: &str, balance: f64) {
        self.store
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

    fn place(&self, owner: &str, amount: f64, direction: Direction, duration_seconds: i64) -> Wager {
        self.trading
            .place_wager(
                owner,
                &PlaceWagerRequest {
                    amount,
                    direction,
                    duration_seconds,
                    instrument: None,
                },
            )
            .unwrap()
    }

    /// Attach a message sink following `owner`'s wager feed.
    fn follow_wagers(&self, owner: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = self.room_manager.register(tx);
        self.room_manager.subscribe_wagers(client_id, owner);
        rx
    }

    /// Advance the clock and tick the feed once per simulated second.
    fn run_feed(&self, seconds: i64) {
        for _ in 0..seconds {
            self.clock.advance(1_000);
            self.engine.tick(self.clock.now_ms());
        }
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_wager_resolves_against_live_feed() {
        let h = Harness::new(71);
        h.fund("u1", 100.0);

        let wager = h.place("u1", 25.0, Direction::Up, 60);
        assert_eq!(h.store.balance_of("u1").unwrap(), 75.0);

        h.run_feed(60);
        assert_eq!(h.scheduler.settle_due(&h.trading), 1);

        let exit = h.engine.current_price("USD").unwrap();
        let settled = h.store.get_wager(&wager.id).unwrap().unwrap();
        assert!(settled.status.is_terminal());
        assert_eq!(settled.exit_price, Some(exit));
        assert_eq!(settled.status == WagerStatus::Won, wager.wins_at(exit));

        let expected_balance = if wager.wins_at(exit) { 120.0 } else { 75.0 };
        assert_eq!(h.store.balance_of("u1").unwrap(), expected_balance);
    }

    #[test]
    fn test_history_is_most_recent_first() {
        let h = Harness::new(72);
        h.fund("u1", 100.0);

        let first = h.place("u1", 5.0, Direction::Up, 60);
        h.run_feed(1);
        let second = h.place("u1", 5.0, Direction::Down, 60);
        h.run_feed(1);
        let third = h.place("u1", 5.0, Direction::Up, 60);

        let history = h.trading.wagers_for_owner("u1", 50);
        let ids: Vec<&str> = history.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);

        let capped = h.trading.wagers_for_owner("u1", 2);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].id, third.id);
    }

    #[test]
    fn test_winnings_fund_the_next_wager() {
        let h = Harness::new(73);
        h.fund("u1", 50.0);

        // Entry far below the price band guarantees an up win.
        let wager = Wager::new("u1", "USD", 50.0, Direction::Up, 60, 0.5, START_MS);
        h.store.place_wager(&wager).unwrap();
        assert_eq!(h.store.balance_of("u1").unwrap(), 0.0);

        h.trading.settle_wager(&wager.id).unwrap();
        assert_eq!(h.store.balance_of("u1").unwrap(), 90.0);

        let next = h.place("u1", 80.0, Direction::Down, 60);
        assert_eq!(next.amount, 80.0);
        assert_eq!(h.store.balance_of("u1").unwrap(), 10.0);
    }
}

// =============================================================================
// Settlement Notification Tests
// =============================================================================

mod notification_tests {
    use super::*;

    #[test]
    fn test_won_settlement_notifies_the_owner_feed() {
        let h = Harness::new(81);
        h.fund("u1", 100.0);
        let mut rx = h.follow_wagers("u1");

        let wager = Wager::new("u1", "USD", 30.0, Direction::Up, 60, 0.5, START_MS);
        h.store.place_wager(&wager).unwrap();
        h.trading.settle_wager(&wager.id).unwrap();

        let raw = rx.try_recv().unwrap();
        let msg: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg["type"], "wager_settled");
        assert_eq!(msg["data"]["wager"]["id"], wager.id.as_str());
        assert_eq!(msg["data"]["wager"]["status"], "won");
        assert_eq!(msg["data"]["won"], true);
        assert_eq!(msg["data"]["payout"], 54.0);
    }

    #[test]
    fn test_lost_settlement_notifies_without_payout() {
        let h = Harness::new(82);
        h.fund("u1", 100.0);
        let mut rx = h.follow_wagers("u1");

        // Entry far above the price band guarantees an up loss.
        let wager = Wager::new("u1", "USD", 30.0, Direction::Up, 60, 99.0, START_MS);
        h.store.place_wager(&wager).unwrap();
        h.trading.settle_wager(&wager.id).unwrap();

        let raw = rx.try_recv().unwrap();
        let msg: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg["type"], "wager_settled");
        assert_eq!(msg["data"]["won"], false);
        assert!(msg["data"].get("payout").is_none());
        assert_eq!(msg["data"]["wager"]["payout"], 0.0);
    }

    #[test]
    fn test_feed_is_scoped_to_the_owner() {
        let h = Harness::new(83);
        h.fund("u1", 100.0);
        h.fund("u2", 100.0);
        let mut u2_rx = h.follow_wagers("u2");

        let wager = h.place("u1", 10.0, Direction::Up, 60);
        h.trading.settle_wager(&wager.id).unwrap();

        assert!(u2_rx.try_recv().is_err());
    }

    #[test]
    fn test_repeat_settlement_does_not_renotify() {
        let h = Harness::new(84);
        h.fund("u1", 100.0);
        let mut rx = h.follow_wagers("u1");

        let wager = h.place("u1", 10.0, Direction::Up, 60);
        h.trading.settle_wager(&wager.id).unwrap();
        h.trading.settle_wager(&wager.id).unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
