//! Relay service: the request-handling surface.
//!
//! Unary handlers (`send_message`, `propose_key_exchange`) validate the
//! request, check the recipient is connected, and push onto its queue. They
//! never write to a stream themselves; delivery happens in the recipient's
//! [`StreamPump`], started by `receive_messages`.
//!
//! Opening and closing a connection touches both the registry and the queue
//! manager. Both are done under one lifecycle lock, in an order that keeps a
//! queue in place for as long as the registry advertises the client: the
//! queue is created before the registry entry, and removed after it.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use ping_proto::rpc::{RpcRequest, RpcResponse};
use ping_proto::types::{ClientId, Empty, ExitCode, KeyExchangeRequest, MessageRequest};
use tokio::sync::Mutex;

use crate::error::RelayError;
use crate::identity;
use crate::pump::{DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, MessageSink, StreamEnd, StreamPump};
use crate::queue::{MessageQueueManager, OutboundMessage, QueueConfig, QueueError};
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};

/// Default maximum message or key size in bytes (64 KB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Tunables of a [`RelayService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Largest accepted message text or key, in bytes.
    pub max_payload_size: usize,
    /// Upper bound on a single queue wait inside a stream pump. Raised to
    /// [`MIN_POLL_INTERVAL`] when smaller.
    pub poll_interval: Duration,
    /// Queue capacity and overflow policy.
    pub queue: QueueConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue: QueueConfig::default(),
        }
    }
}

/// One client's routing state as seen at a single instant.
#[derive(Debug, Clone)]
pub struct ClientState {
    /// The open delivery stream, if any.
    pub connection: Option<ConnectionHandle>,
    /// Messages waiting, or `None` when no queue exists.
    pub queued: Option<usize>,
}

/// Shared relay state: connection registry, queues, and the handlers that
/// operate on them.
pub struct RelayService {
    connections: ConnectionRegistry,
    queues: MessageQueueManager,
    /// Serializes connection open/close so registry and queue move together.
    lifecycle: Mutex<()>,
    max_payload_size: usize,
    poll_interval: Duration,
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayService {
    /// Creates a service with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    /// Creates a service with custom limits.
    ///
    /// A poll interval below [`MIN_POLL_INTERVAL`] is raised to it, so an
    /// idle stream always parks between queue checks.
    #[must_use]
    pub fn with_config(config: ServiceConfig) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            queues: MessageQueueManager::new(config.queue),
            lifecycle: Mutex::new(()),
            max_payload_size: config.max_payload_size,
            poll_interval: config.poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// The queue manager, for stream pumps. Reads here may fall between the
    /// two halves of an open or close; other callers use the inspection
    /// methods below.
    #[must_use]
    pub(crate) const fn queues(&self) -> &MessageQueueManager {
        &self.queues
    }

    /// Upper bound on a single queue wait in this service's stream pumps.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    // -----------------------------------------------------------------------
    // Inspection
    //
    // Each read takes the lifecycle lock, so it never observes a queue
    // without its registry entry or the reverse.
    // -----------------------------------------------------------------------

    /// Whether `id` currently has an open delivery stream.
    pub async fn is_connected(&self, id: &ClientId) -> bool {
        let _guard = self.lifecycle.lock().await;
        self.connections.is_connected(id).await
    }

    /// The current connection of `id`, if any.
    pub async fn connection(&self, id: &ClientId) -> Option<ConnectionHandle> {
        let _guard = self.lifecycle.lock().await;
        self.connections.get(id).await
    }

    /// Whether a queue exists for `id`.
    pub async fn has_queue(&self, id: &ClientId) -> bool {
        let _guard = self.lifecycle.lock().await;
        self.queues.has_queue(id).await
    }

    /// Number of messages waiting for `id`.
    pub async fn queue_len(&self, id: &ClientId) -> usize {
        let _guard = self.lifecycle.lock().await;
        self.queues.queue_len(id).await
    }

    /// Registry entry and queue length of `id`, read together.
    pub async fn client_state(&self, id: &ClientId) -> ClientState {
        let _guard = self.lifecycle.lock().await;
        let connection = self.connections.get(id).await;
        let queued = if self.queues.has_queue(id).await {
            Some(self.queues.queue_len(id).await)
        } else {
            None
        };
        ClientState { connection, queued }
    }

    /// Snapshot of the connected clients.
    pub async fn connected_clients(&self) -> Vec<ClientId> {
        let _guard = self.lifecycle.lock().await;
        self.connections.connected_clients().await
    }

    // -----------------------------------------------------------------------
    // Produce side
    // -----------------------------------------------------------------------

    /// `SendMessage`: queue a chat message for a connected recipient.
    pub async fn send_message(&self, request: MessageRequest) -> ExitCode {
        match self.try_send_message(request).await {
            Ok(_) => ExitCode::ok("Message sent"),
            Err(e) => e.to_exit_code(),
        }
    }

    /// `SendMessage` returning the typed error and the recipient's queue
    /// length on success.
    ///
    /// # Errors
    ///
    /// [`RelayError::InvalidRequest`] for blank ids or oversized text,
    /// [`RelayError::RecipientNotConnected`], or [`RelayError::QueueFull`].
    pub async fn try_send_message(&self, request: MessageRequest) -> Result<usize, RelayError> {
        let sender = parse_client("client", request.client)?;
        let recipient = parse_client("recipient", request.recipient)?;
        self.check_size(request.message.len())?;

        tracing::debug!(
            sender = %sender,
            author = %request.author,
            recipient = %recipient,
            len = request.message.len(),
            "routing message"
        );

        let msg = OutboundMessage::text(sender, request.message);
        self.route(&recipient, msg).await
    }

    /// `ProposeKeyExchange`: queue one half of a handshake for a connected
    /// recipient.
    pub async fn propose_key_exchange(&self, request: KeyExchangeRequest) -> ExitCode {
        match self.try_propose_key_exchange(request).await {
            Ok(_) => ExitCode::ok("Key exchange proposed"),
            Err(e) => e.to_exit_code(),
        }
    }

    /// `ProposeKeyExchange` returning the typed error.
    ///
    /// # Errors
    ///
    /// Same as [`RelayService::try_send_message`].
    pub async fn try_propose_key_exchange(
        &self,
        request: KeyExchangeRequest,
    ) -> Result<usize, RelayError> {
        let sender = parse_client("client", request.client)?;
        let recipient = parse_client("recipient", request.recipient)?;
        self.check_size(request.public_key.len())?;

        tracing::debug!(
            sender = %sender,
            recipient = %recipient,
            init = request.init,
            "routing key exchange"
        );

        let msg = OutboundMessage::key_exchange(sender, request.public_key, request.init);
        self.route(&recipient, msg).await
    }

    async fn route(&self, recipient: &ClientId, msg: OutboundMessage) -> Result<usize, RelayError> {
        if !self.connections.is_connected(recipient).await {
            tracing::info!(recipient = %recipient, "recipient not connected");
            return Err(RelayError::RecipientNotConnected {
                recipient: recipient.to_string(),
            });
        }

        match self.queues.enqueue(recipient, msg).await {
            Ok(len) => Ok(len),
            // Torn down between the registry check and the push.
            Err(QueueError::RecipientNotConnected) => Err(RelayError::RecipientNotConnected {
                recipient: recipient.to_string(),
            }),
            Err(QueueError::QueueFull { capacity }) => {
                tracing::warn!(recipient = %recipient, capacity, "recipient queue full");
                Err(RelayError::QueueFull {
                    recipient: recipient.to_string(),
                    capacity,
                })
            }
        }
    }

    fn check_size(&self, len: usize) -> Result<(), RelayError> {
        if len > self.max_payload_size {
            return Err(RelayError::InvalidRequest(format!(
                "payload too large: {len} bytes (max {})",
                self.max_payload_size
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Consume side
    // -----------------------------------------------------------------------

    /// `ReceiveMessages`: register `request.client` and stream its queue into
    /// `sink` until `cancelled` resolves, the connection is superseded, or a
    /// write fails.
    ///
    /// # Errors
    ///
    /// [`RelayError::InvalidRequest`] for a blank client id (nothing is
    /// registered), or [`RelayError::Transport`] when writing to `sink` fails.
    pub async fn receive_messages<S: MessageSink>(
        &self,
        request: Empty,
        peer_addr: Option<SocketAddr>,
        sink: &mut S,
        cancelled: impl Future<Output = ()>,
    ) -> Result<StreamEnd, RelayError> {
        let client_id = parse_client("client", request.client)?;
        let handle = self.open_connection(&client_id, peer_addr).await;

        StreamPump::new(self, client_id, handle, sink, self.poll_interval)
            .run(cancelled)
            .await
    }

    /// Registers a new connection for `id`, creating (or taking over) its
    /// queue. Any previous connection of `id` is superseded.
    pub async fn open_connection(
        &self,
        id: &ClientId,
        peer_addr: Option<SocketAddr>,
    ) -> ConnectionHandle {
        let handle = ConnectionHandle::new(peer_addr);
        let _guard = self.lifecycle.lock().await;

        let created = self.queues.ensure_queue(id, handle.id).await;
        let previous = self.connections.register(id, handle.clone()).await;

        match previous {
            Some(old) => tracing::info!(
                client_id = %id,
                connection = %handle.id,
                replaced = %old.id,
                "replaced existing connection"
            ),
            None => tracing::info!(
                client_id = %id,
                connection = %handle.id,
                peer = ?peer_addr,
                new_queue = created,
                "client connected"
            ),
        }
        handle
    }

    /// Removes the registry entry and queue of `id`, but only while
    /// `connection` is still the current one.
    ///
    /// Returns `true` if anything was removed.
    pub async fn close_connection(&self, id: &ClientId, connection: ConnectionId) -> bool {
        let _guard = self.lifecycle.lock().await;
        if !self.connections.unregister_if(id, connection).await {
            return false;
        }
        self.queues.remove_queue_if(id, connection).await;
        true
    }

    /// Closes every queue so all stream pumps finish and deregister.
    pub async fn shutdown(&self) {
        let clients = self.connected_clients().await;
        tracing::info!(count = clients.len(), clients = ?clients, "closing all client streams");
        self.queues.close_all().await;
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Handles any unary request. `ReceiveMessages` is not unary and yields
    /// an `InvalidRequest` exit code here.
    pub async fn handle_unary(&self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::SendMessage(req) => RpcResponse::ExitCode(self.send_message(req).await),
            RpcRequest::ProposeKeyExchange(req) => {
                RpcResponse::ExitCode(self.propose_key_exchange(req).await)
            }
            RpcRequest::Login(req) => RpcResponse::ExitCode(identity::login(&req)),
            RpcRequest::Register(req) => RpcResponse::ExitCode(identity::register(&req)),
            RpcRequest::GetFriends(req) => RpcResponse::ServerMessage(identity::get_friends(&req)),
            RpcRequest::AddFriend(req) => RpcResponse::ExitCode(identity::add_friend(&req)),
            RpcRequest::ReceiveMessages(_) => RpcResponse::ExitCode(
                RelayError::InvalidRequest("ReceiveMessages is a streaming call".to_string())
                    .to_exit_code(),
            ),
        }
    }
}

/// Validates a wire identifier into a [`ClientId`].
fn parse_client(field: &str, value: String) -> Result<ClientId, RelayError> {
    ClientId::new(value).map_err(|_| RelayError::InvalidRequest(format!("{field} must not be empty")))
}
