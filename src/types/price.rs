use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the latest price movement relative to the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickDirection {
    Up,
    Down,
}

impl fmt::Display for TickDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickDirection::Up => write!(f, "up"),
            TickDirection::Down => write!(f, "down"),
        }
    }
}

/// A quotable instrument: a fiat currency priced off the shared base series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Currency code, e.g. "USD".
    pub code: String,
    /// Display symbol, e.g. "$".
    pub symbol: String,
    /// Conversion rate applied to the base price.
    pub rate: f64,
}

impl Instrument {
    pub fn new(code: impl Into<String>, symbol: impl Into<String>, rate: f64) -> Self {
        Self {
            code: code.into(),
            symbol: symbol.into(),
            rate,
        }
    }
}

/// One published price point for an instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    pub instrument: String,
    pub symbol: String,
    pub price: f64,
    pub timestamp: i64,
    pub direction: TickDirection,
}

/// OHLC candle for one instrument over a fixed time bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub instrument: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Bucket start, aligned to the candle interval (ms).
    pub period_start: i64,
    /// Exclusive bucket end (ms).
    pub period_end: i64,
}

impl Candle {
    /// Open a new candle at `price` for the bucket containing `timestamp`.
    pub fn open_at(instrument: impl Into<String>, price: f64, timestamp: i64, interval_ms: i64) -> Self {
        let period_start = timestamp - timestamp.rem_euclid(interval_ms);
        Self {
            instrument: instrument.into(),
            open: price,
            high: price,
            low: price,
            close: price,
            period_start,
            period_end: period_start + interval_ms,
        }
    }

    /// Fold a new price into the candle.
    pub fn apply(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    /// Whether `timestamp` falls outside this candle's bucket.
    pub fn is_expired_at(&self, timestamp: i64) -> bool {
        timestamp >= self.period_end
    }
}
