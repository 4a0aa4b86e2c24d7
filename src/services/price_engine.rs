//! Price Engine Service
//!
//! Generates the simulated price feed every instrument quotes off.
//! Provides:
//! - A single random-walk base series with bounded drift and trend flips
//! - Per-instrument derived prices (base price times conversion rate)
//! - Per-instrument OHLC candle aggregation over fixed time buckets
//! - Broadcast fan-out of tick and candle events

use crate::config::FeedConfig;
use crate::types::{Candle, Instrument, PriceTick, TickDirection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Event published on the feed channel.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A new price point for one instrument.
    Tick(PriceTick),
    /// A completed candle for one instrument.
    Candle(Candle),
}

/// Mutable tick state. Only the tick loop (or a test driving `tick`
/// directly) takes this lock; price readers never do.
struct TickState {
    rng: StdRng,
    /// Current drift direction: +1.0 or -1.0.
    trend_sign: f64,
    /// Open candle per instrument code.
    open_candles: HashMap<String, Candle>,
}

/// Simulated price feed with a single base series.
pub struct PriceEngine {
    instruments: Vec<Instrument>,
    config: FeedConfig,
    /// Last published base price as f64 bits, readable without a lock.
    base_bits: AtomicU64,
    state: Mutex<TickState>,
    tx: broadcast::Sender<FeedEvent>,
}

impl PriceEngine {
    /// Create a new engine seeded from entropy.
    pub fn new(instruments: Vec<Instrument>, config: FeedConfig) -> Arc<Self> {
        Self::with_rng(instruments, config, StdRng::from_entropy())
    }

    /// Create a new engine with a fixed seed. Two engines built with the
    /// same seed and config produce identical tick sequences.
    pub fn with_seed(instruments: Vec<Instrument>, config: FeedConfig, seed: u64) -> Arc<Self> {
        Self::with_rng(instruments, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(instruments: Vec<Instrument>, config: FeedConfig, rng: StdRng) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(1024);
        Arc::new(Self {
            instruments,
            base_bits: AtomicU64::new(config.initial_price.to_bits()),
            state: Mutex::new(TickState {
                rng,
                trend_sign: 1.0,
                open_candles: HashMap::new(),
            }),
            config,
            tx,
        })
    }

    /// Subscribe to tick and candle events.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Configured instruments.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Current base price. Lock-free.
    pub fn base_price(&self) -> f64 {
        f64::from_bits(self.base_bits.load(Ordering::Relaxed))
    }

    /// Current derived price for an instrument, or None if the code is
    /// not configured. Lock-free.
    pub fn current_price(&self, code: &str) -> Option<f64> {
        let instrument = self.instruments.iter().find(|i| i.code == code)?;
        Some(round4(self.base_price() * instrument.rate))
    }

    /// Advance the series one step at `now_ms` and publish the resulting
    /// events. Returns the published events so tests can drive the engine
    /// without a subscriber.
    pub fn tick(&self, now_ms: i64) -> Vec<FeedEvent> {
        let previous = self.base_price();
        let mut state = self.state.lock().unwrap();

        if state.rng.gen_bool(self.config.trend_flip_probability) {
            state.trend_sign = -state.trend_sign;
        }

        let noise = (state.rng.gen::<f64>() - 0.5) * self.config.volatility;
        let drift = state.trend_sign * self.config.volatility * 0.1;
        let mut next = previous + noise + drift;
        if !next.is_finite() {
            next = previous;
        }
        next = next.clamp(self.config.floor, self.config.ceiling);

        self.base_bits.store(next.to_bits(), Ordering::Relaxed);

        // Direction reflects the published movement after drift and
        // clamping; an unchanged price reads as up.
        let direction = if next >= previous {
            TickDirection::Up
        } else {
            TickDirection::Down
        };

        let mut events = Vec::with_capacity(self.instruments.len());
        for instrument in &self.instruments {
            let price = round4(next * instrument.rate);

            match state.open_candles.get_mut(&instrument.code) {
                Some(candle) if !candle.is_expired_at(now_ms) => {
                    candle.apply(price);
                }
                Some(candle) => {
                    let completed = candle.clone();
                    debug!(
                        "Candle closed for {}: o={} h={} l={} c={}",
                        instrument.code, completed.open, completed.high, completed.low, completed.close
                    );
                    *candle = Candle::open_at(
                        instrument.code.clone(),
                        price,
                        now_ms,
                        self.config.candle_interval_ms,
                    );
                    events.push(FeedEvent::Candle(completed));
                }
                None => {
                    state.open_candles.insert(
                        instrument.code.clone(),
                        Candle::open_at(
                            instrument.code.clone(),
                            price,
                            now_ms,
                            self.config.candle_interval_ms,
                        ),
                    );
                }
            }

            events.push(FeedEvent::Tick(PriceTick {
                instrument: instrument.code.clone(),
                symbol: instrument.symbol.clone(),
                price,
                timestamp: now_ms,
                direction,
            }));
        }
        drop(state);

        for event in &events {
            let _ = self.tx.send(event.clone());
        }
        events
    }

    /// Run the tick loop forever at the configured interval.
    pub async fn run(self: Arc<Self>) {
        let interval = std::time::Duration::from_millis(self.config.tick_interval_ms);
        loop {
            tokio::time::sleep(interval).await;
            let now = chrono::Utc::now().timestamp_millis();
            self.tick(now);
        }
    }
}

/// Round to 4 decimal places, the feed's display precision.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
