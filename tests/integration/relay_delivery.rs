// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for directed delivery through a running relay.
//!
//! Every test starts a relay on an ephemeral port and talks to it with
//! [`RelayClient`] over real WebSockets.
//!
//! Verification command: `cargo test --test relay_delivery`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ping_proto::rpc::{self, RpcResponse};
use ping_proto::status::StatusCode;
use ping_proto::types::{ClientId, KeyExchangeRequest, MessageKind, MessageRequest, ServerMessage};
use ping_relay::client::{MessageStream, RelayClient};
use ping_relay::server;
use ping_relay::service::{RelayService, ServiceConfig};
use tokio_tungstenite::tungstenite::Message;

// =============================================================================
// Test helpers
// =============================================================================

async fn start_relay(config: ServiceConfig) -> (SocketAddr, Arc<RelayService>) {
    let service = Arc::new(RelayService::with_config(config));
    let (addr, _handle) =
        server::start_server_with_service("127.0.0.1:0", Arc::clone(&service), std::future::pending())
            .await
            .expect("failed to start relay");
    (addr, service)
}

fn fast_config() -> ServiceConfig {
    ServiceConfig {
        poll_interval: Duration::from_millis(20),
        ..ServiceConfig::default()
    }
}

/// Opens a `ReceiveMessages` stream and waits until the relay has
/// registered it.
async fn open_stream(
    client: &RelayClient,
    service: &RelayService,
    id: &str,
) -> MessageStream {
    let stream = client.receive_messages(id).await.expect("stream open failed");
    let client_id = ClientId::new(id).unwrap();
    for _ in 0..200 {
        if service.is_connected(&client_id).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{id} never registered");
}

async fn wait_disconnected(service: &RelayService, id: &str) {
    let client_id = ClientId::new(id).unwrap();
    for _ in 0..200 {
        if !service.is_connected(&client_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{id} still registered");
}

async fn next_frame(stream: &mut MessageStream) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(3), stream.next())
        .await
        .expect("timed out waiting for delivery")
        .expect("stream closed")
        .expect("stream error")
}

fn message(from: &str, to: &str, text: &str) -> MessageRequest {
    MessageRequest {
        client: from.to_string(),
        author: format!("{from}#1234"),
        recipient: to.to_string(),
        message: text.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn message_reaches_connected_recipient() {
    let (addr, service) = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(addr);
    let mut bob = open_stream(&client, &service, "bob").await;

    let code = client.send_message(message("alice", "bob", "hi")).await.unwrap();
    assert!(code.is_success(), "{code:?}");

    let frame = next_frame(&mut bob).await;
    let resp = frame.message_response.expect("message_response missing");
    assert_eq!(resp.kind, MessageKind::Message);
    assert_eq!(resp.sender, "alice");
    assert_eq!(resp.content_text(), Some("hi"));
    assert!(frame.exit_code.unwrap().is_success());

    bob.close().await;
}

#[tokio::test]
async fn unknown_recipient_is_refused() {
    let (addr, service) = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(addr);

    let code = client.send_message(message("alice", "carol", "hello")).await.unwrap();
    assert_eq!(code.status_code(), Some(StatusCode::RecipientNotConnected));
    assert!(!code.message.is_empty());
    assert!(!service.has_queue(&ClientId::new("carol").unwrap()).await);
}

#[tokio::test]
async fn messages_from_one_sender_keep_their_order() {
    let (addr, service) = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(addr);
    let mut bob = open_stream(&client, &service, "bob").await;

    for i in 0..20 {
        let code = client
            .send_message(message("alice", "bob", &format!("msg-{i}")))
            .await
            .unwrap();
        assert!(code.is_success());
    }
    for i in 0..20 {
        let frame = next_frame(&mut bob).await;
        let resp = frame.message_response.unwrap();
        assert_eq!(resp.content_text(), Some(format!("msg-{i}").as_str()));
    }

    bob.close().await;
}

#[tokio::test]
async fn key_exchange_halves_are_tagged() {
    let (addr, service) = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(addr);
    let mut bob = open_stream(&client, &service, "bob").await;
    let key: Vec<u8> = (0..=255).collect();

    for init in [true, false] {
        let code = client
            .propose_key_exchange(KeyExchangeRequest {
                client: "alice".to_string(),
                recipient: "bob".to_string(),
                public_key: key.clone(),
                init,
            })
            .await
            .unwrap();
        assert!(code.is_success());

        let resp = next_frame(&mut bob).await.message_response.unwrap();
        assert_eq!(resp.kind, MessageKind::key_exchange(init));
        assert_eq!(resp.sender, "alice");
        assert_eq!(resp.content, key);
    }

    bob.close().await;
}

#[tokio::test]
async fn messages_to_different_recipients_stay_separate() {
    let (addr, service) = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(addr);
    let mut bob = open_stream(&client, &service, "bob").await;
    let mut carol = open_stream(&client, &service, "carol").await;

    client.send_message(message("alice", "bob", "for bob")).await.unwrap();
    client.send_message(message("alice", "carol", "for carol")).await.unwrap();

    let to_bob = next_frame(&mut bob).await.message_response.unwrap();
    let to_carol = next_frame(&mut carol).await.message_response.unwrap();
    assert_eq!(to_bob.content_text(), Some("for bob"));
    assert_eq!(to_carol.content_text(), Some("for carol"));

    bob.close().await;
    carol.close().await;
}

#[tokio::test]
async fn closed_stream_makes_recipient_unreachable() {
    let (addr, service) = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(addr);
    let mut bob = open_stream(&client, &service, "bob").await;

    let code = client.send_message(message("alice", "bob", "ping1")).await.unwrap();
    assert!(code.is_success());
    let resp = next_frame(&mut bob).await.message_response.unwrap();
    assert_eq!(resp.content_text(), Some("ping1"));

    bob.close().await;
    wait_disconnected(&service, "bob").await;

    let code = client.send_message(message("alice", "bob", "ping2")).await.unwrap();
    assert_eq!(code.status_code(), Some(StatusCode::RecipientNotConnected));
}

#[tokio::test]
async fn oversized_message_is_invalid() {
    let (addr, service) = start_relay(ServiceConfig {
        max_payload_size: 16,
        ..fast_config()
    })
    .await;
    let client = RelayClient::for_addr(addr);
    let bob = open_stream(&client, &service, "bob").await;

    let code = client
        .send_message(message("alice", "bob", &"x".repeat(17)))
        .await
        .unwrap();
    assert_eq!(code.status_code(), Some(StatusCode::InvalidRequest));

    bob.close().await;
}

#[tokio::test]
async fn garbage_frame_gets_invalid_request() {
    let (addr, _service) = start_relay(fast_config()).await;
    let url = format!("ws://{addr}{}", server::RPC_PATH);

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws.send(Message::Binary(vec![0xff, 0xff, 0xff].into()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(3), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Binary(data) = reply else {
        panic!("expected binary reply, got {reply:?}");
    };
    match rpc::decode_response(&data).unwrap() {
        RpcResponse::ExitCode(code) => {
            assert_eq!(code.status_code(), Some(StatusCode::InvalidRequest));
        }
        other => panic!("expected ExitCode, got {other:?}"),
    }
}
