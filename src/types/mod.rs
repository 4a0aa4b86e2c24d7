pub mod account;
pub mod price;
pub mod wager;
pub mod ws;

pub use account::*;
pub use price::*;
pub use wager::*;
pub use ws::*;
