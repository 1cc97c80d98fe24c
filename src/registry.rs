//! Connection registry.
//!
//! The matchmaking engine only ever talks to connections through the
//! [`Registry`] trait: "send this event to connection X" and "is X still
//! open". [`ConnectionRegistry`] is the implementation used by the WebSocket
//! transport, mapping each id to the channel feeding that connection's writer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::signaling::protocol::OutboundEvent;

/// Transport-assigned identifier of one active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Capability the engine needs from the transport.
///
/// `send` is fire-and-forget with at-most-once delivery: if the connection
/// is not open the event is dropped and nothing is reported back.
pub trait Registry: Send + Sync {
    fn send(&self, to: ConnectionId, event: OutboundEvent);

    fn is_open(&self, id: ConnectionId) -> bool;
}

/// Message sender for a connected client
pub type ConnectionSender = mpsc::UnboundedSender<OutboundEvent>;

/// Receiving half handed to the connection's writer task
pub type ConnectionReceiver = mpsc::UnboundedReceiver<OutboundEvent>;

/// Registry of open connections backed by unbounded channels.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionSender>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh id and open a channel for it.
    ///
    /// Ids are never reused within the lifetime of the registry.
    pub fn register(&self) -> (ConnectionId, ConnectionReceiver) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().insert(id, tx);
        (id, rx)
    }

    /// Forget a connection. Idempotent.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(&id).is_some()
    }

    /// Number of currently registered connections
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for ConnectionRegistry {
    fn send(&self, to: ConnectionId, event: OutboundEvent) {
        let connections = self.connections.lock();
        match connections.get(&to) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Dropped event for {}: writer already gone", to);
                }
            }
            None => debug!("Dropped event for {}: not connected", to),
        }
    }

    fn is_open(&self, id: ConnectionId) -> bool {
        self.connections
            .lock()
            .get(&id)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }
}
