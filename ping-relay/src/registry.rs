//! Connection registry: which clients currently hold an open delivery stream.
//!
//! The registry is the single source of truth for "is X connected". It only
//! tracks handles; it never touches the streams themselves, so none of its
//! operations block on I/O.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use ping_proto::types::ClientId;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// Identifies one `ReceiveMessages` call, distinguishing successive
/// connections of the same client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new time-ordered connection identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to an open delivery stream.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Identifies the stream.
    pub id: ConnectionId,
    /// Remote address of the adapter, when the transport knows it.
    pub peer_addr: Option<SocketAddr>,
    /// When the stream was registered.
    pub connected_at: Instant,
}

impl ConnectionHandle {
    /// Creates a handle for a freshly opened stream.
    #[must_use]
    pub fn new(peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_addr,
            connected_at: Instant::now(),
        }
    }

    /// How long the stream has been open.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Thread-safe map from [`ClientId`] to its current [`ConnectionHandle`].
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ClientId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the handle for `id`, returning the one it replaced.
    ///
    /// The previous handle is not closed here; its stream stops on its own
    /// once it notices it no longer owns the client's queue.
    pub async fn register(
        &self,
        id: &ClientId,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let mut conns = self.connections.write().await;
        conns.insert(id.clone(), handle)
    }

    /// Removes `id`, returning its handle if it was registered.
    pub async fn unregister(&self, id: &ClientId) -> Option<ConnectionHandle> {
        let mut conns = self.connections.write().await;
        conns.remove(id)
    }

    /// Removes `id` only while `connection` is still its current handle.
    ///
    /// Returns `true` if the entry was removed.
    pub async fn unregister_if(&self, id: &ClientId, connection: ConnectionId) -> bool {
        let mut conns = self.connections.write().await;
        if conns.get(id).is_some_and(|h| h.id == connection) {
            conns.remove(id);
            true
        } else {
            false
        }
    }

    /// Returns a clone of the handle for `id`, if registered.
    pub async fn get(&self, id: &ClientId) -> Option<ConnectionHandle> {
        let conns = self.connections.read().await;
        conns.get(id).cloned()
    }

    /// Whether `id` currently has an open stream.
    pub async fn is_connected(&self, id: &ClientId) -> bool {
        let conns = self.connections.read().await;
        conns.contains_key(id)
    }

    /// Number of connected clients.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no client is connected.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Snapshot of the connected client identifiers.
    pub async fn connected_clients(&self) -> Vec<ClientId> {
        let conns = self.connections.read().await;
        conns.keys().cloned().collect()
    }
}
