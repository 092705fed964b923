//! Property-based codec tests.
//!
//! Uses proptest to verify:
//! 1. Any `RpcRequest` survives encode → decode.
//! 2. Any `RpcResponse` survives encode → decode.
//! 3. Random bytes never cause a panic in either decoder.
//! 4. A valid frame with bytes appended is rejected.

use ping_proto::rpc::{self, RpcRequest, RpcResponse};
use ping_proto::types::{
    AddFriendRequest, Empty, ExitCode, FriendListRequest, KeyExchangeRequest, LoginRequest,
    MessageKind, MessageRequest, MessageResponse, RegisterRequest, ServerMessage,
};
use proptest::prelude::*;

fn arb_text() -> impl Strategy<Value = String> {
    "\\PC{0,64}"
}

fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn arb_request() -> impl Strategy<Value = RpcRequest> {
    prop_oneof![
        (arb_text(), arb_text(), arb_text(), arb_text()).prop_map(
            |(client, author, recipient, message)| {
                RpcRequest::SendMessage(MessageRequest {
                    client,
                    author,
                    recipient,
                    message,
                })
            }
        ),
        (arb_text(), arb_text(), arb_bytes(), any::<bool>()).prop_map(
            |(client, recipient, public_key, init)| {
                RpcRequest::ProposeKeyExchange(KeyExchangeRequest {
                    client,
                    recipient,
                    public_key,
                    init,
                })
            }
        ),
        arb_text().prop_map(|client| RpcRequest::ReceiveMessages(Empty { client })),
        (arb_text(), arb_text())
            .prop_map(|(username, password)| RpcRequest::Login(LoginRequest { username, password })),
        (arb_text(), arb_text(), arb_text(), arb_text()).prop_map(
            |(username, email, password, confirm_password)| {
                RpcRequest::Register(RegisterRequest {
                    username,
                    email,
                    password,
                    confirm_password,
                })
            }
        ),
        arb_text().prop_map(|client| RpcRequest::GetFriends(FriendListRequest { client })),
        (arb_text(), arb_text())
            .prop_map(|(client, friend)| RpcRequest::AddFriend(AddFriendRequest { client, friend })),
    ]
}

fn arb_exit_code() -> impl Strategy<Value = ExitCode> {
    (any::<u32>(), arb_text()).prop_map(|(status, message)| ExitCode { status, message })
}

fn arb_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::Message),
        Just(MessageKind::KeyExchangeInit),
        Just(MessageKind::KeyExchangeResponse),
    ]
}

fn arb_response() -> impl Strategy<Value = RpcResponse> {
    let message_response = (arb_kind(), arb_bytes(), arb_text()).prop_map(|(kind, content, sender)| {
        MessageResponse {
            kind,
            content,
            sender,
        }
    });
    prop_oneof![
        arb_exit_code().prop_map(RpcResponse::ExitCode),
        (
            proptest::option::of(message_response),
            proptest::option::of(arb_exit_code())
        )
            .prop_map(|(message_response, exit_code)| {
                RpcResponse::ServerMessage(ServerMessage {
                    message_response,
                    exit_code,
                })
            }),
    ]
}

proptest! {
    #[test]
    fn request_roundtrip(request in arb_request()) {
        let bytes = rpc::encode_request(&request).unwrap();
        let decoded = rpc::decode_request(&bytes).unwrap();
        prop_assert_eq!(request, decoded);
    }

    #[test]
    fn response_roundtrip(response in arb_response()) {
        let bytes = rpc::encode_response(&response).unwrap();
        let decoded = rpc::decode_response(&bytes).unwrap();
        prop_assert_eq!(response, decoded);
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..1024)) {
        let _ = rpc::decode_request(&bytes);
        let _ = rpc::decode_response(&bytes);
    }

    #[test]
    fn trailing_bytes_are_rejected(
        request in arb_request(),
        extra in prop::collection::vec(any::<u8>(), 1..16),
    ) {
        let mut bytes = rpc::encode_request(&request).unwrap();
        bytes.extend_from_slice(&extra);
        prop_assert!(rpc::decode_request(&bytes).is_err());
    }
}
