//! ConnectionRegistry — live broadcast targets keyed by connection id.
//!
//! Each entry is the outbound queue sender for one WebSocket connection.
//! A send fails only when the connection's writer task has dropped the
//! receiving end, so a failed send is the registry's signal to prune.
//! Nothing outside register/unregister/pruning mutates the map.

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Opaque per-connection identifier, generated at register time.
pub type ConnectionId = String;

#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection's outbound queue. Returns its fresh id.
    pub fn register(&self, tx: mpsc::UnboundedSender<Message>) -> ConnectionId {
        let id = uuid::Uuid::new_v4().to_string();
        self.conns.insert(id.clone(), tx);
        id
    }

    /// Remove a connection. Idempotent.
    pub fn unregister(&self, id: &str) {
        self.conns.remove(id);
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Send a text frame to one connection. Prunes the entry and returns
    /// false if its queue has closed.
    pub fn send_to(&self, id: &str, frame: &str) -> bool {
        let Some(tx) = self.conns.get(id).map(|entry| entry.value().clone()) else {
            return false;
        };
        if tx.send(Message::Text(frame.to_owned().into())).is_ok() {
            true
        } else {
            warn!("connection {id} is dead, pruning");
            self.conns.remove(id);
            false
        }
    }

    /// Send identical bytes to every live connection, pruning dead ones
    /// mid-iteration instead of propagating the failure. Returns the number
    /// of connections the frame was delivered to. No ordering guarantee
    /// across connections.
    pub fn broadcast(&self, frame: &str) -> usize {
        let text = Utf8Bytes::from(frame.to_owned());
        let mut delivered = 0;
        let mut dead: Vec<ConnectionId> = Vec::new();

        for entry in self.conns.iter() {
            if entry.value().send(Message::Text(text.clone())).is_ok() {
                delivered += 1;
            } else {
                dead.push(entry.key().clone());
            }
        }

        // Removal happens after iteration; removing from a DashMap shard
        // while iterating it can deadlock.
        for id in dead {
            debug!("pruning dead connection {id} during broadcast");
            self.conns.remove(&id);
        }

        delivered
    }
}
