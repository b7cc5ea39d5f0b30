//! Registry of live WebSocket dashboard connections.
//!
//! Each connection gets its own unbounded channel; the socket task
//! drains the receiver while the sender sits in a shared map keyed by
//! connection id. Broadcast walks the map and prunes any connection
//! whose channel has closed, so a dead socket can never wedge delivery
//! to the rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared registry handle. Clones refer to the same connection map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    // Sync mutex: every critical section is a short map operation and
    // never held across an await point.
    connections: Arc<Mutex<HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection, returning its id and the receiving
    /// half the socket task should drain.
    pub fn connect(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let count = {
            let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            connections.insert(id, tx);
            connections.len()
        };
        info!(connection_id = %id, total = count, "websocket client connected");

        (id, rx)
    }

    /// Remove a connection. Safe to call more than once for the same id.
    pub fn disconnect(&self, id: Uuid) {
        let removed = {
            let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            connections.remove(&id).is_some()
        };
        if removed {
            info!(connection_id = %id, "websocket client disconnected");
        }
    }

    /// Deliver `message` to every live connection.
    ///
    /// Connections whose channel has closed are dropped from the map;
    /// returns how many connections were actually reached.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut stale = Vec::new();
        let delivered = {
            let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            let mut delivered = 0;
            for (id, tx) in connections.iter() {
                if tx.send(message.to_string()).is_ok() {
                    delivered += 1;
                } else {
                    stale.push(*id);
                }
            }
            delivered
        };

        if !stale.is_empty() {
            let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            for id in &stale {
                connections.remove(id);
            }
            debug!(pruned = stale.len(), "pruned closed websocket connections");
        }

        debug!(delivered, "broadcast complete");
        delivered
    }

    /// Deliver `message` to a single connection.
    ///
    /// Returns `false` if the connection is gone or its channel closed.
    pub fn send_to(&self, id: Uuid, message: String) -> bool {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        match connections.get(&id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
