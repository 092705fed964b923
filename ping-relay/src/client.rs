//! Client for the relay RPC surface, used by platform adapters.
//!
//! Each call opens its own WebSocket, sends one [`RpcRequest`] and reads the
//! reply. [`RelayClient::receive_messages`] keeps its socket open and yields
//! delivered frames through a [`MessageStream`]; dropping or closing the
//! stream is what cancels the call on the relay side.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ping_proto::codec::CodecError;
use ping_proto::rpc::{self, RpcRequest, RpcResponse};
use ping_proto::types::{
    AddFriendRequest, Empty, ExitCode, FriendListRequest, KeyExchangeRequest, LoginRequest,
    MessageRequest, RegisterRequest, ServerMessage,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::server::RPC_PATH;

/// Default timeout for connecting to the relay.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a unary reply.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors from [`RelayClient`] calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The WebSocket could not be opened.
    #[error("failed to connect to relay: {0}")]
    Connect(String),
    /// Connecting or waiting for a reply took too long.
    #[error("relay call timed out")]
    Timeout,
    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The relay closed the connection before replying.
    #[error("connection closed by relay")]
    ConnectionClosed,
    /// The relay replied with a frame of the wrong shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    /// The relay refused a `ReceiveMessages` call.
    #[error("stream rejected: {} ({})", .0.message, .0.status)]
    Rejected(ExitCode),
}

/// Handle for calling a relay at a fixed URL.
#[derive(Debug, Clone)]
pub struct RelayClient {
    url: String,
    response_timeout: Duration,
}

impl RelayClient {
    /// Creates a client for a full `ws://host:port/rpc` URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Creates a client for a relay bound at `addr`.
    #[must_use]
    pub fn for_addr(addr: SocketAddr) -> Self {
        Self::new(format!("ws://{addr}{RPC_PATH}"))
    }

    /// Overrides how long unary calls wait for their reply.
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// The relay URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `SendMessage`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failures; relay-side rejections
    /// come back as a non-zero [`ExitCode`].
    pub async fn send_message(&self, request: MessageRequest) -> Result<ExitCode, ClientError> {
        self.call_exit_code(RpcRequest::SendMessage(request)).await
    }

    /// `ProposeKeyExchange`.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send_message`].
    pub async fn propose_key_exchange(
        &self,
        request: KeyExchangeRequest,
    ) -> Result<ExitCode, ClientError> {
        self.call_exit_code(RpcRequest::ProposeKeyExchange(request))
            .await
    }

    /// `Login`.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send_message`].
    pub async fn login(&self, request: LoginRequest) -> Result<ExitCode, ClientError> {
        self.call_exit_code(RpcRequest::Login(request)).await
    }

    /// `Register`.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send_message`].
    pub async fn register(&self, request: RegisterRequest) -> Result<ExitCode, ClientError> {
        self.call_exit_code(RpcRequest::Register(request)).await
    }

    /// `AddFriend`.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send_message`].
    pub async fn add_friend(&self, request: AddFriendRequest) -> Result<ExitCode, ClientError> {
        self.call_exit_code(RpcRequest::AddFriend(request)).await
    }

    /// `GetFriends`.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send_message`].
    pub async fn get_friends(
        &self,
        request: FriendListRequest,
    ) -> Result<ServerMessage, ClientError> {
        match self.call(RpcRequest::GetFriends(request)).await? {
            RpcResponse::ServerMessage(msg) => Ok(msg),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// `ReceiveMessages`: opens the delivery stream for `client`.
    ///
    /// The relay registers the client once it has read the request; a
    /// rejection arrives as the first item of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the connection or the request frame fails.
    pub async fn receive_messages(&self, client: &str) -> Result<MessageStream, ClientError> {
        let mut ws = self.connect().await?;
        let request = RpcRequest::ReceiveMessages(Empty {
            client: client.to_string(),
        });
        send_request(&mut ws, &request).await?;
        Ok(MessageStream { ws })
    }

    /// Sends one unary request and reads its reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on connect, codec or timeout failures.
    pub async fn call(&self, request: RpcRequest) -> Result<RpcResponse, ClientError> {
        let mut ws = self.connect().await?;
        send_request(&mut ws, &request).await?;

        let response = tokio::time::timeout(self.response_timeout, next_response(&mut ws))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let _ = ws.close(None).await;
        response.ok_or(ClientError::ConnectionClosed)
    }

    async fn call_exit_code(&self, request: RpcRequest) -> Result<ExitCode, ClientError> {
        match self.call(request).await? {
            RpcResponse::ExitCode(code) => Ok(code),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    async fn connect(&self) -> Result<WsStream, ClientError> {
        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&self.url))
            .await
            .map_err(|_| {
                tracing::warn!(url = %self.url, "relay connect timed out");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = %self.url, error = %e, "relay connect failed");
                ClientError::Connect(e.to_string())
            })?;
        Ok(ws)
    }
}

/// Open `ReceiveMessages` call.
pub struct MessageStream {
    ws: WsStream,
}

impl MessageStream {
    /// Waits for the next delivered frame.
    ///
    /// Returns `None` once the relay closes the stream.
    pub async fn next(&mut self) -> Option<Result<ServerMessage, ClientError>> {
        match next_response(&mut self.ws).await {
            Ok(Some(RpcResponse::ServerMessage(msg))) => Some(Ok(msg)),
            Ok(Some(RpcResponse::ExitCode(code))) => Some(Err(ClientError::Rejected(code))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// Cancels the call by closing the WebSocket.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
        // Drain until the relay acknowledges, so the close is observed.
        while let Some(Ok(_)) = self.ws.next().await {}
    }
}

async fn send_request(ws: &mut WsStream, request: &RpcRequest) -> Result<(), ClientError> {
    let bytes = rpc::encode_request(request)?;
    ws.send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| ClientError::Connect(format!("failed to send request: {e}")))
}

/// Reads frames until a response, a close, or the end of the stream.
async fn next_response(ws: &mut WsStream) -> Result<Option<RpcResponse>, ClientError> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Binary(data)) => return Ok(Some(rpc::decode_response(&data)?)),
            Ok(Message::Close(_)) | Err(_) => return Ok(None),
            Ok(_) => {}
        }
    }
    Ok(None)
}
