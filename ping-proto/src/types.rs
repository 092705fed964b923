//! Request and response types of the Ping relay RPC surface.
//!
//! Field names follow the service contract adapters already speak
//! (`client`, `recipient`, `publicKey` as `public_key`, ...). Identifier
//! fields stay plain `String`s on the wire; the relay validates them into
//! [`ClientId`] on arrival.

use serde::{Deserialize, Serialize};

use crate::status::StatusCode;

/// Separator used in the friend list returned by `GetFriends`.
pub const FRIEND_LIST_DELIMITER: char = ';';

/// Error returned when constructing a [`ClientId`] from a blank string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("client id must not be empty")]
pub struct EmptyClientId;

/// Opaque identity of a relay client, platform-qualified by convention
/// (e.g. a Discord user ID or a Telegram username).
///
/// Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Creates a client identifier, rejecting blank input.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyClientId`] if `id` is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyClientId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EmptyClientId);
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ClientId {
    type Error = EmptyClientId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for ClientId {
    type Error = EmptyClientId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a delivered [`MessageResponse`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Chat text from `SendMessage`.
    Message,
    /// Initiating half of a key-exchange handshake.
    KeyExchangeInit,
    /// Responding half of a key-exchange handshake.
    KeyExchangeResponse,
}

impl MessageKind {
    /// Returns the handshake kind for the `init` flag of `ProposeKeyExchange`.
    #[must_use]
    pub const fn key_exchange(init: bool) -> Self {
        if init {
            Self::KeyExchangeInit
        } else {
            Self::KeyExchangeResponse
        }
    }

    /// Returns the type label adapters display (`"Message"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "Message",
            Self::KeyExchangeInit => "KeyExchangeInit",
            Self::KeyExchangeResponse => "KeyExchangeResponse",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `SendMessage` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Sending client; becomes the `sender` of the delivered message.
    pub client: String,
    /// Platform-level author (e.g. the Discord user who typed the message).
    pub author: String,
    /// Client the message is addressed to.
    pub recipient: String,
    /// Message text.
    pub message: String,
}

/// `ProposeKeyExchange` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeRequest {
    /// Proposing client.
    pub client: String,
    /// Client the handshake step is addressed to.
    pub recipient: String,
    /// Key material, forwarded verbatim.
    pub public_key: Vec<u8>,
    /// `true` for the initiating half, `false` for the response.
    pub init: bool,
}

/// `ReceiveMessages` request: opens the server-push stream for `client`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {
    /// Client whose messages should be streamed.
    pub client: String,
}

/// `Login` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    /// Plaintext password.
    pub password: String,
}

/// `Register` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Requested username.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Password.
    pub password: String,
    /// Password typed a second time.
    pub confirm_password: String,
}

/// `GetFriends` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendListRequest {
    /// Client whose friend list is requested.
    pub client: String,
}

/// `AddFriend` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFriendRequest {
    /// Client adding the friend.
    pub client: String,
    /// Identity being added.
    pub friend: String,
}

/// Status code plus human-readable message returned by every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCode {
    /// `0` on success; see [`crate::status`] for the failure codes.
    pub status: u32,
    /// Human-readable description.
    pub message: String,
}

impl ExitCode {
    /// Creates an exit code for the given status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.code(),
            message: message.into(),
        }
    }

    /// Creates a success exit code.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok, message)
    }

    /// Whether the status is `0`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Returns the typed status, if the code is known.
    #[must_use]
    pub const fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_code(self.status)
    }
}

/// One delivered unit of payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Chat message or handshake step.
    pub kind: MessageKind,
    /// Message text (UTF-8) or key material (opaque bytes).
    pub content: Vec<u8>,
    /// Client that produced the payload.
    pub sender: String,
}

impl MessageResponse {
    /// Returns the content as text when it is valid UTF-8.
    #[must_use]
    pub fn content_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Frame pushed on the `ReceiveMessages` stream, also returned by `GetFriends`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// The delivered payload, if any.
    pub message_response: Option<MessageResponse>,
    /// Status attached to the frame.
    pub exit_code: Option<ExitCode>,
}

impl ServerMessage {
    /// Builds a friend-list reply with `friends` joined by [`FRIEND_LIST_DELIMITER`].
    #[must_use]
    pub fn friend_list(friends: &[String], exit_code: ExitCode) -> Self {
        let joined = friends.join(&FRIEND_LIST_DELIMITER.to_string());
        Self {
            message_response: Some(MessageResponse {
                kind: MessageKind::Message,
                content: joined.into_bytes(),
                sender: String::new(),
            }),
            exit_code: Some(exit_code),
        }
    }

    /// Splits the content of a friend-list reply back into identifiers.
    ///
    /// An empty list yields an empty `Vec`.
    #[must_use]
    pub fn friends(&self) -> Vec<String> {
        self.message_response
            .as_ref()
            .and_then(MessageResponse::content_text)
            .map(|text| {
                text.split(FRIEND_LIST_DELIMITER)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
