use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{ClientMessage, ServerMessage};
use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_client(socket, state))
}

async fn serve_client(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound queue: the rooms push JSON strings here and the pump
    // drains them onto the socket.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let client_id = state.room_manager.register(out_tx);
    info!("WebSocket client connected: {}", client_id);

    let pump = tokio::spawn(async move {
        while let Some(json) = out_rx.recv().await {
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                error!("WebSocket transport error for {}: {}", client_id, e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                debug!("Client {} sent: {}", client_id, text);
                let ack = dispatch(&state, client_id, &text);
                push(&state, client_id, &ack);
            }
            Message::Close(_) => {
                debug!("Client {} sent close", client_id);
                break;
            }
            // axum answers pings itself
            Message::Ping(_) => {}
            _ => {}
        }
    }

    state.room_manager.unregister(client_id);
    pump.abort();
    info!("WebSocket client disconnected: {}", client_id);
}

/// Applies one client request and returns the acknowledgement to send back.
fn dispatch(state: &AppState, client_id: Uuid, text: &str) -> ServerMessage {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return ServerMessage::Error {
                error: format!("Invalid message: {}", e),
            }
        }
    };

    match msg {
        ClientMessage::Subscribe { instruments } => {
            let instruments = state.room_manager.subscribe(client_id, &instruments);
            debug!("Client {} subscribed to: {:?}", client_id, instruments);
            ServerMessage::Subscribed { instruments }
        }
        ClientMessage::Unsubscribe { instruments } => {
            let instruments = state.room_manager.unsubscribe(client_id, &instruments);
            debug!("Client {} unsubscribed from: {:?}", client_id, instruments);
            ServerMessage::Unsubscribed { instruments }
        }
        ClientMessage::SubscribeWagers { user_id } => {
            state.room_manager.subscribe_wagers(client_id, &user_id);
            debug!("Client {} following wagers of {}", client_id, user_id);
            ServerMessage::WagersSubscribed { user_id }
        }
        ClientMessage::UnsubscribeWagers { user_id } => {
            state.room_manager.unsubscribe_wagers(client_id, &user_id);
            debug!("Client {} stopped following wagers of {}", client_id, user_id);
            ServerMessage::WagersUnsubscribed { user_id }
        }
    }
}

fn push(state: &AppState, client_id: Uuid, msg: &ServerMessage) {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return,
    };

    if let Some(client) = state.room_manager.clients.get(&client_id) {
        let _ = client.tx.send(json);
    }
}
