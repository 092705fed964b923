//! RPC framing for the Ping relay.
//!
//! Each WebSocket connection to the relay carries exactly one call. The
//! client opens with a single [`RpcRequest`] frame; the relay answers with one
//! [`RpcResponse`] for unary methods, or with a stream of
//! [`RpcResponse::ServerMessage`] frames for `ReceiveMessages`. The relay
//! never inspects message text or key material, only routing metadata.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::types::{
    AddFriendRequest, Empty, ExitCode, FriendListRequest, KeyExchangeRequest, LoginRequest,
    MessageRequest, RegisterRequest, ServerMessage,
};

/// Opening frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Enqueue a chat message for a connected recipient.
    SendMessage(MessageRequest),
    /// Enqueue one half of a key-exchange handshake.
    ProposeKeyExchange(KeyExchangeRequest),
    /// Turn this connection into the caller's delivery stream.
    ReceiveMessages(Empty),
    /// Stub login.
    Login(LoginRequest),
    /// Stub registration.
    Register(RegisterRequest),
    /// Stub friend list lookup.
    GetFriends(FriendListRequest),
    /// Stub friend addition.
    AddFriend(AddFriendRequest),
}

impl RpcRequest {
    /// Returns the method name, for logging.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "SendMessage",
            Self::ProposeKeyExchange(_) => "ProposeKeyExchange",
            Self::ReceiveMessages(_) => "ReceiveMessages",
            Self::Login(_) => "Login",
            Self::Register(_) => "Register",
            Self::GetFriends(_) => "GetFriends",
            Self::AddFriend(_) => "AddFriend",
        }
    }
}

/// Frame sent by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    /// Result of a unary call, or the rejection of a `ReceiveMessages` call.
    ExitCode(ExitCode),
    /// A delivered message on the stream, or the `GetFriends` reply.
    ServerMessage(ServerMessage),
}

/// Encodes a request frame.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_request(request: &RpcRequest) -> Result<Vec<u8>, CodecError> {
    codec::encode(request)
}

/// Decodes a request frame.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is not a valid request.
pub fn decode_request(bytes: &[u8]) -> Result<RpcRequest, CodecError> {
    codec::decode(bytes)
}

/// Encodes a response frame.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_response(response: &RpcResponse) -> Result<Vec<u8>, CodecError> {
    codec::encode(response)
}

/// Decodes a response frame.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is not a valid response.
pub fn decode_response(bytes: &[u8]) -> Result<RpcResponse, CodecError> {
    codec::decode(bytes)
}
