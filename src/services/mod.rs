pub mod price_engine;
pub mod settlement;
pub mod sqlite_store;
pub mod trading;

pub use price_engine::{FeedEvent, PriceEngine};
pub use settlement::{Clock, ManualClock, SettlementScheduler, SystemClock};
pub use sqlite_store::{LedgerError, SettleOutcome, SqliteStore};
pub use trading::{TradeError, TradingService};
