//! Per-client bounded outbound queues.
//!
//! The [`MessageQueueManager`] holds one FIFO of [`OutboundMessage`]s per
//! connected client. Producers (unary handlers) push with [`enqueue`]; the
//! client's stream pump pops with [`dequeue`]. Each queue is capped at a
//! configured capacity, and what happens at the cap is an explicit
//! [`OverflowPolicy`].
//!
//! A queue is owned by exactly one [`ConnectionId`] at a time. Only the owner
//! may dequeue; when a client reconnects, ownership moves to the new stream
//! and the previous stream's pump sees [`Dequeued::Closed`].
//!
//! [`enqueue`]: MessageQueueManager::enqueue
//! [`dequeue`]: MessageQueueManager::dequeue

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ping_proto::types::{ClientId, ExitCode, MessageKind, MessageResponse, ServerMessage};
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;

use crate::registry::ConnectionId;

/// Default number of slots per client queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default time a producer waits for space in a full queue.
pub const DEFAULT_ENQUEUE_WAIT: Duration = Duration::from_millis(250);

/// A queued unit of relay-to-client payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Chat message or handshake step.
    pub kind: MessageKind,
    /// Client that produced it.
    pub sender: ClientId,
    /// Text bytes or key material, never inspected.
    pub content: Vec<u8>,
}

impl OutboundMessage {
    /// A chat message.
    #[must_use]
    pub fn text(sender: ClientId, text: String) -> Self {
        Self {
            kind: MessageKind::Message,
            sender,
            content: text.into_bytes(),
        }
    }

    /// One half of a key-exchange handshake.
    #[must_use]
    pub const fn key_exchange(sender: ClientId, public_key: Vec<u8>, init: bool) -> Self {
        Self {
            kind: MessageKind::key_exchange(init),
            sender,
            content: public_key,
        }
    }

    /// Converts into the frame written to the recipient's stream.
    #[must_use]
    pub fn into_server_message(self) -> ServerMessage {
        let status = match self.kind {
            MessageKind::Message => "Message enqueued",
            MessageKind::KeyExchangeInit | MessageKind::KeyExchangeResponse => {
                "Key exchange forwarded"
            }
        };
        ServerMessage {
            message_response: Some(MessageResponse {
                kind: self.kind,
                content: self.content,
                sender: self.sender.as_str().to_string(),
            }),
            exit_code: Some(ExitCode::ok(status)),
        }
    }
}

/// What `enqueue` does when the recipient's queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait up to `wait` for a slot, then fail with [`QueueError::QueueFull`].
    BlockThenFail {
        /// Longest time a producer is held.
        wait: Duration,
    },
    /// Evict the oldest queued message to make room. Evictions are logged.
    DropOldest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::BlockThenFail {
            wait: DEFAULT_ENQUEUE_WAIT,
        }
    }
}

/// Capacity and overflow behavior shared by every queue of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Slots per queue, at least 1.
    pub capacity: usize,
    /// Behavior at capacity.
    pub overflow: OverflowPolicy,
}

impl QueueConfig {
    /// Creates a config; a zero capacity is raised to 1.
    #[must_use]
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            overflow,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }
}

/// Reasons an enqueue is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// No queue exists for the client, or it was destroyed while waiting.
    #[error("recipient not connected")]
    RecipientNotConnected,
    /// The queue stayed full for the whole wait.
    #[error("queue full (capacity {capacity})")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Outcome of a [`MessageQueueManager::dequeue`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    /// The next message in FIFO order.
    Message(OutboundMessage),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The queue was removed, or now belongs to another connection.
    Closed,
}

struct QueueState {
    items: VecDeque<OutboundMessage>,
    owner: ConnectionId,
    closed: bool,
}

/// One client's queue. The state lock is never held across an `.await`.
struct MessageQueue {
    state: parking_lot::Mutex<QueueState>,
    /// Signalled when an item is pushed or the queue changes hands/closes.
    readable: Notify,
    /// Signalled when an item is popped or the queue closes.
    writable: Notify,
}

impl MessageQueue {
    fn new(owner: ConnectionId, capacity: usize) -> Self {
        Self {
            state: parking_lot::Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                owner,
                closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    async fn push(
        &self,
        recipient: &ClientId,
        msg: OutboundMessage,
        config: &QueueConfig,
    ) -> Result<usize, QueueError> {
        let deadline = match config.overflow {
            OverflowPolicy::BlockThenFail { wait } => Some(Instant::now() + wait),
            OverflowPolicy::DropOldest => None,
        };

        loop {
            let writable = self.writable.notified();
            tokio::pin!(writable);
            // Register interest before inspecting state so a pop between the
            // check and the await is not missed.
            writable.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(QueueError::RecipientNotConnected);
                }
                if state.items.len() < config.capacity {
                    state.items.push_back(msg);
                    let len = state.items.len();
                    drop(state);
                    self.readable.notify_waiters();
                    return Ok(len);
                }
                if deadline.is_none() {
                    state.items.pop_front();
                    state.items.push_back(msg);
                    let len = state.items.len();
                    drop(state);
                    tracing::warn!(
                        client_id = %recipient,
                        capacity = config.capacity,
                        "queue full, evicted oldest message"
                    );
                    self.readable.notify_waiters();
                    return Ok(len);
                }
            }

            let Some(deadline) = deadline else {
                continue;
            };
            if tokio::time::timeout_at(deadline, writable).await.is_err() {
                return Err(QueueError::QueueFull {
                    capacity: config.capacity,
                });
            }
        }
    }

    async fn pop(&self, owner: ConnectionId, timeout: Duration) -> Dequeued {
        let deadline = Instant::now() + timeout;

        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed || state.owner != owner {
                    return Dequeued::Closed;
                }
                if let Some(msg) = state.items.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Dequeued::Message(msg);
                }
            }

            if tokio::time::timeout_at(deadline, readable).await.is_err() {
                return Dequeued::Timeout;
            }
        }
    }

    fn claim(&self, owner: ConnectionId) {
        self.state.lock().owner = owner;
        self.readable.notify_waiters();
    }

    fn owned_by(&self, owner: ConnectionId) -> bool {
        self.state.lock().owner == owner
    }

    /// Marks the queue closed and drops unread messages, returning how many.
    fn close(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            let n = state.items.len();
            state.items.clear();
            n
        };
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        discarded
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

/// Thread-safe map from [`ClientId`] to its bounded outbound queue.
pub struct MessageQueueManager {
    queues: RwLock<HashMap<ClientId, Arc<MessageQueue>>>,
    config: QueueConfig,
}

impl Default for MessageQueueManager {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl MessageQueueManager {
    /// Creates an empty manager whose queues follow `config`.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Returns the queue configuration.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Creates the queue for `id` if missing and hands it to `owner`.
    ///
    /// Idempotent with respect to contents: an existing queue keeps its
    /// unread messages and only changes owner. Returns `true` if a new queue
    /// was created.
    pub async fn ensure_queue(&self, id: &ClientId, owner: ConnectionId) -> bool {
        let mut queues = self.queues.write().await;
        if let Some(queue) = queues.get(id) {
            queue.claim(owner);
            return false;
        }
        queues.insert(
            id.clone(),
            Arc::new(MessageQueue::new(owner, self.config.capacity)),
        );
        true
    }

    /// Pushes `msg` onto the queue of `id`, returning the new queue length.
    ///
    /// May wait up to the configured overflow wait when the queue is full.
    ///
    /// # Errors
    ///
    /// [`QueueError::RecipientNotConnected`] if `id` has no queue (or it is
    /// destroyed while waiting), [`QueueError::QueueFull`] if no slot frees
    /// up in time.
    pub async fn enqueue(&self, id: &ClientId, msg: OutboundMessage) -> Result<usize, QueueError> {
        let queue = self
            .lookup(id)
            .await
            .ok_or(QueueError::RecipientNotConnected)?;
        queue.push(id, msg, &self.config).await
    }

    /// Pops the next message for `id` on behalf of `owner`, waiting at most
    /// `timeout`.
    pub async fn dequeue(&self, id: &ClientId, owner: ConnectionId, timeout: Duration) -> Dequeued {
        match self.lookup(id).await {
            Some(queue) => queue.pop(owner, timeout).await,
            None => Dequeued::Closed,
        }
    }

    /// Destroys the queue for `id`, discarding unread messages.
    ///
    /// Returns the number of discarded messages; `0` if there was no queue.
    pub async fn remove_queue(&self, id: &ClientId) -> usize {
        let removed = self.queues.write().await.remove(id);
        removed.map_or(0, |queue| queue.close())
    }

    /// Destroys the queue for `id` only while `owner` still owns it.
    ///
    /// Returns `true` if the queue was removed.
    pub async fn remove_queue_if(&self, id: &ClientId, owner: ConnectionId) -> bool {
        let mut queues = self.queues.write().await;
        if !queues.get(id).is_some_and(|q| q.owned_by(owner)) {
            return false;
        }
        let removed = queues.remove(id);
        drop(queues);
        if let Some(queue) = removed {
            let discarded = queue.close();
            if discarded > 0 {
                tracing::info!(client_id = %id, discarded, "discarded undelivered messages");
            }
        }
        true
    }

    /// Whether a queue exists for `id`.
    pub async fn has_queue(&self, id: &ClientId) -> bool {
        self.queues.read().await.contains_key(id)
    }

    /// Number of messages currently queued for `id`.
    pub async fn queue_len(&self, id: &ClientId) -> usize {
        self.lookup(id).await.map_or(0, |q| q.len())
    }

    /// Closes every queue without removing it, waking all pumps and
    /// producers. Used on shutdown; each pump then tears down its own entry.
    pub async fn close_all(&self) {
        let queues = self.queues.read().await;
        for (id, queue) in queues.iter() {
            let discarded = queue.close();
            tracing::debug!(client_id = %id, discarded, "queue closed for shutdown");
        }
    }

    async fn lookup(&self, id: &ClientId) -> Option<Arc<MessageQueue>> {
        self.queues.read().await.get(id).cloned()
    }
}
