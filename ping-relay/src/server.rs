//! WebSocket front end of the relay.
//!
//! Every WebSocket accepted on `/rpc` carries exactly one call:
//!
//! 1. Wait for the opening [`RpcRequest`] frame.
//! 2. Unary methods: answer with one [`RpcResponse`] and close.
//! 3. `ReceiveMessages`: hand the write half to the client's stream pump and
//!    treat the read half ending (close frame, error, EOF) as cancellation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ping_proto::rpc::{self, RpcRequest, RpcResponse};
use ping_proto::types::{ExitCode, ServerMessage};

use crate::error::RelayError;
use crate::pump::{MessageSink, StreamEnd};
use crate::service::RelayService;

/// Path of the RPC endpoint.
pub const RPC_PATH: &str = "/rpc";

/// How long a fresh connection may take to send its opening frame.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Write half of an accepted WebSocket.
type WsSender = SplitSink<WebSocket, Message>;

/// [`MessageSink`] over the write half of a client's WebSocket.
struct WsSink {
    sender: WsSender,
}

impl MessageSink for WsSink {
    async fn deliver(&mut self, message: ServerMessage) -> Result<(), RelayError> {
        send_response(&mut self.sender, &RpcResponse::ServerMessage(message)).await
    }
}

/// Handles one upgraded WebSocket.
pub async fn handle_socket(socket: WebSocket, service: Arc<RelayService>, peer: Option<SocketAddr>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let request = match tokio::time::timeout(REQUEST_TIMEOUT, wait_for_request(&mut ws_receiver))
        .await
    {
        Ok(Ok(request)) => request,
        Ok(Err(None)) => {
            tracing::debug!(peer = ?peer, "connection closed before a request arrived");
            return;
        }
        Ok(Err(Some(reason))) => {
            tracing::warn!(peer = ?peer, reason = %reason, "rejecting malformed request");
            let code = RelayError::InvalidRequest(reason).to_exit_code();
            reply_and_close(&mut ws_sender, code).await;
            return;
        }
        Err(_) => {
            tracing::warn!(peer = ?peer, "timed out waiting for request");
            return;
        }
    };

    tracing::debug!(peer = ?peer, method = request.method(), "rpc call");

    match request {
        RpcRequest::ReceiveMessages(empty) => {
            let client = empty.client.clone();
            let mut sink = WsSink { sender: ws_sender };
            let result = service
                .receive_messages(empty, peer, &mut sink, wait_for_close(ws_receiver))
                .await;
            match result {
                Ok(StreamEnd::Cancelled) => {}
                Ok(StreamEnd::Closed) => {
                    let _ = sink.sender.send(Message::Close(None)).await;
                }
                Err(e @ RelayError::InvalidRequest(_)) => {
                    tracing::warn!(peer = ?peer, error = %e, "rejected ReceiveMessages");
                    reply_and_close(&mut sink.sender, e.to_exit_code()).await;
                }
                Err(e) => {
                    tracing::warn!(client_id = %client, error = %e, "stream ended with error");
                }
            }
        }
        unary => {
            let response = service.handle_unary(unary).await;
            if let Err(e) = send_response(&mut ws_sender, &response).await {
                tracing::warn!(peer = ?peer, error = %e, "failed to send response");
                return;
            }
            let _ = ws_sender.send(Message::Close(None)).await;
        }
    }
}

/// Waits for the opening request frame.
///
/// `Err(None)` means the peer left without sending one; `Err(Some(reason))`
/// means it sent something that is not a request.
async fn wait_for_request(
    receiver: &mut SplitStream<WebSocket>,
) -> Result<RpcRequest, Option<String>> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => {
                return rpc::decode_request(&data).map_err(|e| Some(e.to_string()));
            }
            Message::Text(_) => return Err(Some("expected a binary frame".to_string())),
            Message::Close(_) => return Err(None),
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    Err(None)
}

/// Resolves when the client stops reading: close frame, error or EOF.
///
/// Frames a streaming client sends after its request are ignored.
async fn wait_for_close(mut receiver: SplitStream<WebSocket>) {
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }
}

async fn send_response(sender: &mut WsSender, response: &RpcResponse) -> Result<(), RelayError> {
    let bytes = rpc::encode_response(response).map_err(|e| RelayError::Internal(e.to_string()))?;
    sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| RelayError::Transport(format!("WebSocket send error: {e}")))
}

async fn reply_and_close(sender: &mut WsSender, code: ExitCode) {
    if send_response(sender, &RpcResponse::ExitCode(code)).await.is_ok() {
        let _ = sender.send(Message::Close(None)).await;
    }
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(service): State<Arc<RelayService>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service, Some(peer)))
}

/// Builds the axum router serving [`RPC_PATH`].
pub fn router(service: Arc<RelayService>) -> axum::Router {
    axum::Router::new()
        .route(RPC_PATH, axum::routing::get(ws_handler))
        .with_state(service)
}

/// Starts the relay on `addr` with a default [`RelayService`], returning the
/// bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_service(addr, Arc::new(RelayService::new()), std::future::pending()).await
}

/// Starts the relay with a pre-configured service.
///
/// When `shutdown` resolves, every client stream is closed and the server
/// stops accepting connections; the join handle then completes.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_service(
    addr: &str,
    service: Arc<RelayService>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<
    (SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(Arc::clone(&service));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let graceful = async move {
            shutdown.await;
            service.shutdown().await;
        };
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful)
        .await
        {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}
