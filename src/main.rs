use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use punt::api;
use punt::config::Config;
use punt::services::{FeedEvent, PriceEngine, SettlementScheduler, SqliteStore, TradingService};
use punt::types::ServerMessage;
use punt::websocket::{ws_handler, RoomManager};
use punt::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up .env if present
    dotenvy::dotenv().ok();

    // Tracing, with RUST_LOG override
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "punt=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load and validate configuration
    let config = Config::from_env();
    config.validate()?;
    info!("Starting punt server on {}:{}", config.host, config.port);

    // Persistence, price feed, settlement, and WebSocket rooms
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    let engine = PriceEngine::new(config.instruments.clone(), config.feed.clone());
    let scheduler = SettlementScheduler::new();
    let room_manager = RoomManager::new();

    let mut trading =
        TradingService::new(store.clone(), engine.clone(), scheduler.clone(), &config);
    trading.set_room_manager(room_manager.clone());
    let trading = Arc::new(trading);

    // Start the price loop
    tokio::spawn(engine.clone().run());

    // Start the settlement loop
    tokio::spawn(scheduler.clone().run(trading.clone()));

    // Fan prices and candles out to subscribed WebSocket clients
    {
        let engine = engine.clone();
        let room_manager = room_manager.clone();
        tokio::spawn(async move {
            let mut feed_rx = engine.subscribe();
            loop {
                match feed_rx.recv().await {
                    Ok(event) => {
                        let (instrument, msg) = match event {
                            FeedEvent::Tick(tick) => (
                                tick.instrument.clone(),
                                ServerMessage::PriceUpdate { data: tick },
                            ),
                            FeedEvent::Candle(candle) => (
                                candle.instrument.clone(),
                                ServerMessage::CandleUpdate { data: candle },
                            ),
                        };
                        if let Ok(json) = serde_json::to_string(&msg) {
                            room_manager.broadcast(&instrument, &json);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Feed fan-out lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let state = AppState {
        store,
        trading,
        room_manager,
    };

    // Permissive CORS for the demo frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(api::router())
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("punt server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
