use crate::types::Instrument;
use std::env;

/// Price feed tuning parameters.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Interval between simulated ticks (ms).
    pub tick_interval_ms: u64,
    /// Magnitude of the per-tick random perturbation.
    pub volatility: f64,
    /// Probability that the drift direction flips on any given tick.
    pub trend_flip_probability: f64,
    /// Base price the series starts from.
    pub initial_price: f64,
    /// Lower bound the base price is clamped to.
    pub floor: f64,
    /// Upper bound the base price is clamped to.
    pub ceiling: f64,
    /// Candle bucket width (ms).
    pub candle_interval_ms: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            volatility: 0.0001,
            trend_flip_probability: 0.1,
            initial_price: 1.2345,
            floor: 1.2000,
            ceiling: 1.2700,
            candle_interval_ms: 60_000,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database path (":memory:" for ephemeral runs).
    pub database_path: String,
    /// Multiplier applied to the stake when a wager wins.
    pub payout_multiplier: f64,
    /// Longest accepted wager duration (seconds).
    pub max_wager_duration_secs: i64,
    /// Price feed parameters.
    pub feed: FeedConfig,
    /// Instruments quoted off the shared base price series.
    pub instruments: Vec<Instrument>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);

        let instruments = env::var("INSTRUMENTS")
            .ok()
            .map(|s| parse_instruments(&s))
            .filter(|parsed| !parsed.is_empty())
            .unwrap_or_else(default_instruments);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "punt.db".to_string()),
            payout_multiplier: env::var("PAYOUT_MULTIPLIER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.8),
            max_wager_duration_secs: env::var("MAX_WAGER_DURATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86_400),
            feed: FeedConfig {
                tick_interval_ms: env::var("TICK_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
                volatility: env::var("VOLATILITY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0001),
                trend_flip_probability: env::var("TREND_FLIP_PROBABILITY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.1),
                initial_price: env::var("INITIAL_PRICE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1.2345),
                floor: env::var("PRICE_FLOOR")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1.2000),
                ceiling: env::var("PRICE_CEILING")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1.2700),
                candle_interval_ms: env::var("CANDLE_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60_000),
            },
            instruments,
        }
    }

    /// Validate the loaded configuration. Run once at startup so a bad
    /// instrument table or price band fails fast instead of surfacing
    /// mid-trade.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.instruments.is_empty() {
            anyhow::bail!("no instruments configured");
        }
        for instrument in &self.instruments {
            if instrument.code.is_empty() {
                anyhow::bail!("instrument with empty code");
            }
            if !instrument.rate.is_finite() || instrument.rate <= 0.0 {
                anyhow::bail!(
                    "instrument {} has invalid rate {}",
                    instrument.code,
                    instrument.rate
                );
            }
        }
        let mut codes: Vec<&str> = self.instruments.iter().map(|i| i.code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        if codes.len() != self.instruments.len() {
            anyhow::bail!("duplicate instrument codes");
        }

        let feed = &self.feed;
        if feed.tick_interval_ms == 0 {
            anyhow::bail!("tick interval must be positive");
        }
        if feed.candle_interval_ms <= 0 {
            anyhow::bail!("candle interval must be positive");
        }
        if !feed.volatility.is_finite() || feed.volatility <= 0.0 {
            anyhow::bail!("volatility must be a positive finite number");
        }
        if !(0.0..=1.0).contains(&feed.trend_flip_probability) {
            anyhow::bail!("trend flip probability must be within [0, 1]");
        }
        if feed.floor >= feed.ceiling {
            anyhow::bail!(
                "price floor {} must be below ceiling {}",
                feed.floor,
                feed.ceiling
            );
        }
        if !(feed.floor..=feed.ceiling).contains(&feed.initial_price) {
            anyhow::bail!(
                "initial price {} outside band [{}, {}]",
                feed.initial_price,
                feed.floor,
                feed.ceiling
            );
        }

        if !self.payout_multiplier.is_finite() || self.payout_multiplier <= 1.0 {
            anyhow::bail!(
                "payout multiplier {} must exceed 1.0",
                self.payout_multiplier
            );
        }
        if self.max_wager_duration_secs <= 0 {
            anyhow::bail!("max wager duration must be positive");
        }

        Ok(())
    }

    /// Look up a configured instrument by code.
    pub fn instrument(&self, code: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.code == code)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_path: "punt.db".to_string(),
            payout_multiplier: 1.8,
            max_wager_duration_secs: 86_400,
            feed: FeedConfig::default(),
            instruments: default_instruments(),
        }
    }
}

/// Parse instruments from the INSTRUMENTS env var.
/// Format: "code|symbol|rate,code2|symbol2|rate2"
fn parse_instruments(raw: &str) -> Vec<Instrument> {
    raw.split(',')
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('|').collect();
            if parts.len() >= 3 {
                parts[2]
                    .trim()
                    .parse()
                    .ok()
                    .map(|rate| Instrument::new(parts[0].trim(), parts[1].trim(), rate))
            } else {
                None
            }
        })
        .collect()
}

/// Built-in fiat instruments used when INSTRUMENTS is not set.
fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("USD", "$", 1.0),
        Instrument::new("GBP", "£", 0.79),
        Instrument::new("CNY", "¥", 7.25),
        Instrument::new("INR", "₹", 83.1),
        Instrument::new("BDT", "৳", 117.5),
    ]
}
