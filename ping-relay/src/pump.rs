//! Per-connection delivery loop.
//!
//! A [`StreamPump`] drains one client's queue into that client's open stream.
//! It waits on two sources at once: the stream's cancellation signal and the
//! next queued message. Queue waits are event driven; the poll interval only
//! bounds how long a single wait may last.
//!
//! ```text
//! Registering -> Streaming -> Closed(Cancelled)
//!                          -> Closed(Closed)      queue superseded or shut down
//!                          -> Closed(WriteError)  returned as Err
//! ```

use std::future::Future;
use std::time::Duration;

use ping_proto::types::{ClientId, ServerMessage};

use crate::error::RelayError;
use crate::queue::Dequeued;
use crate::registry::ConnectionHandle;
use crate::service::RelayService;

/// Default upper bound on a single queue wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest poll interval accepted; smaller values are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Destination of delivered frames: the write half of a client's stream.
pub trait MessageSink: Send {
    /// Writes one frame to the stream.
    ///
    /// An error means the transport is gone; the pump does not retry.
    fn deliver(
        &mut self,
        message: ServerMessage,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;
}

/// How a stream ended without a write error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The caller disconnected or cancelled.
    Cancelled,
    /// The queue was handed to a newer connection or closed for shutdown.
    Closed,
}

/// Drains the queue of one connected client into its sink.
pub struct StreamPump<'a, S> {
    service: &'a RelayService,
    client_id: ClientId,
    handle: ConnectionHandle,
    sink: &'a mut S,
    poll_interval: Duration,
    delivered: u64,
}

impl<'a, S: MessageSink> StreamPump<'a, S> {
    /// Creates a pump for a connection already registered with `service`.
    pub const fn new(
        service: &'a RelayService,
        client_id: ClientId,
        handle: ConnectionHandle,
        sink: &'a mut S,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            client_id,
            handle,
            sink,
            poll_interval,
            delivered: 0,
        }
    }

    /// Runs until `cancelled` resolves, the queue closes, or a write fails.
    ///
    /// Every exit path tears down this connection's registry and queue
    /// entries, unless a newer connection already replaced them.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if writing to the sink fails.
    pub async fn run(mut self, cancelled: impl Future<Output = ()>) -> Result<StreamEnd, RelayError> {
        tokio::pin!(cancelled);

        loop {
            let next = tokio::select! {
                biased;
                () = &mut cancelled => {
                    self.teardown("stream cancelled").await;
                    return Ok(StreamEnd::Cancelled);
                }
                next = self.service.queues().dequeue(
                    &self.client_id,
                    self.handle.id,
                    self.poll_interval,
                ) => next,
            };

            match next {
                Dequeued::Timeout => {}
                Dequeued::Closed => {
                    self.teardown("queue closed").await;
                    return Ok(StreamEnd::Closed);
                }
                Dequeued::Message(msg) => {
                    let sender = msg.sender.clone();
                    let kind = msg.kind;
                    if let Err(e) = self.sink.deliver(msg.into_server_message()).await {
                        tracing::warn!(
                            client_id = %self.client_id,
                            connection = %self.handle.id,
                            error = %e,
                            "stream write failed"
                        );
                        self.teardown("write failed").await;
                        return Err(e);
                    }
                    self.delivered += 1;
                    tracing::debug!(
                        client_id = %self.client_id,
                        sender = %sender,
                        kind = %kind,
                        "delivered"
                    );
                }
            }
        }
    }

    async fn teardown(&self, reason: &'static str) {
        let removed = self
            .service
            .close_connection(&self.client_id, self.handle.id)
            .await;
        tracing::info!(
            client_id = %self.client_id,
            connection = %self.handle.id,
            delivered = self.delivered,
            connected_ms = u64::try_from(self.handle.age().as_millis()).unwrap_or(u64::MAX),
            removed,
            reason,
            "stream closed"
        );
    }
}
