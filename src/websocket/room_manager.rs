//! Connection registry for the WebSocket fan-out.
//!
//! Clients join price rooms keyed by instrument code and wager feeds keyed
//! by owner id. Rooms hold client ids only; each client's sender lives in
//! the registry so a dropped connection is cleaned up in one place.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-connection state: what the client listens to and how to reach it.
pub struct ClientSubscription {
    /// Instrument codes this client receives ticks and candles for.
    pub instruments: HashSet<String>,
    /// Owner ids whose wager settlements this client follows.
    pub wager_feeds: HashSet<String>,
    /// Outbound queue feeding this client's socket.
    pub tx: mpsc::UnboundedSender<String>,
}

/// Tracks connected clients and the rooms they occupy.
pub struct RoomManager {
    /// Connection registry keyed by client id.
    pub clients: DashMap<Uuid, ClientSubscription>,
    /// Price rooms: instrument code -> member client ids.
    rooms: DashMap<String, HashSet<Uuid>>,
    /// Wager feeds: owner id -> member client ids.
    wager_rooms: DashMap<String, HashSet<Uuid>>,
}

impl RoomManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
            wager_rooms: DashMap::new(),
        })
    }

    /// Admit a connection and hand back its id.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let client_id = Uuid::new_v4();
        self.clients.insert(
            client_id,
            ClientSubscription {
                instruments: HashSet::new(),
                wager_feeds: HashSet::new(),
                tx,
            },
        );
        client_id
    }

    /// Drop a connection and clear its room memberships.
    pub fn unregister(&self, client_id: Uuid) {
        let Some((_, subscription)) = self.clients.remove(&client_id) else {
            return;
        };

        for code in subscription.instruments {
            if let Some(mut room) = self.rooms.get_mut(&code) {
                room.remove(&client_id);
            }
        }
        for owner_id in subscription.wager_feeds {
            if let Some(mut room) = self.wager_rooms.get_mut(&owner_id) {
                room.remove(&client_id);
            }
        }
    }

    /// Join price rooms. Codes are normalized to uppercase; returns the
    /// codes that were newly joined, skipping ones already held.
    pub fn subscribe(&self, client_id: Uuid, instruments: &[String]) -> Vec<String> {
        let mut joined = Vec::new();

        if let Some(mut client) = self.clients.get_mut(&client_id) {
            for code in instruments {
                let code = code.to_uppercase();
                if client.instruments.insert(code.clone()) {
                    self.rooms
                        .entry(code.clone())
                        .or_insert_with(HashSet::new)
                        .insert(client_id);
                    joined.push(code);
                }
            }
        }

        joined
    }

    /// Leave price rooms; returns the codes that were actually left.
    pub fn unsubscribe(&self, client_id: Uuid, instruments: &[String]) -> Vec<String> {
        let mut left = Vec::new();

        if let Some(mut client) = self.clients.get_mut(&client_id) {
            for code in instruments {
                let code = code.to_uppercase();
                if client.instruments.remove(&code) {
                    if let Some(mut room) = self.rooms.get_mut(&code) {
                        room.remove(&client_id);
                    }
                    left.push(code);
                }
            }
        }

        left
    }

    /// Follow an owner's wager settlement feed.
    pub fn subscribe_wagers(&self, client_id: Uuid, owner_id: &str) {
        if let Some(mut client) = self.clients.get_mut(&client_id) {
            if client.wager_feeds.insert(owner_id.to_string()) {
                self.wager_rooms
                    .entry(owner_id.to_string())
                    .or_insert_with(HashSet::new)
                    .insert(client_id);
            }
        }
    }

    /// Stop following an owner's wager settlement feed.
    pub fn unsubscribe_wagers(&self, client_id: Uuid, owner_id: &str) {
        if let Some(mut client) = self.clients.get_mut(&client_id) {
            if client.wager_feeds.remove(owner_id) {
                if let Some(mut room) = self.wager_rooms.get_mut(owner_id) {
                    room.remove(&client_id);
                }
            }
        }
    }

    /// Senders for every client in an instrument's price room.
    ///
    /// Member ids are copied out first; the room guard must not be held
    /// across the registry lookup.
    pub fn get_subscribers(&self, instrument: &str) -> Vec<mpsc::UnboundedSender<String>> {
        let members: Vec<Uuid> = match self.rooms.get(&instrument.to_uppercase()) {
            Some(room) => room.iter().copied().collect(),
            None => return Vec::new(),
        };

        members
            .into_iter()
            .filter_map(|id| self.clients.get(&id).map(|c| c.tx.clone()))
            .collect()
    }

    /// Deliver a message to an instrument's price room.
    pub fn broadcast(&self, instrument: &str, message: &str) {
        for tx in self.get_subscribers(instrument) {
            let _ = tx.send(message.to_string());
        }
    }

    /// Deliver a message to everyone following an owner's wagers.
    pub fn broadcast_wagers(&self, owner_id: &str, message: &str) {
        let members: Vec<Uuid> = self
            .wager_rooms
            .get(owner_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default();

        for id in members {
            if let Some(client) = self.clients.get(&id) {
                let _ = client.tx.send(message.to_string());
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Price rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.iter().filter(|r| !r.is_empty()).count()
    }
}
