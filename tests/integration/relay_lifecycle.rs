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

//! Integration tests for stream lifecycle: registration, cancellation,
//! reconnection, rejection and server shutdown.
//!
//! Verification command: `cargo test --test relay_lifecycle`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ping_proto::status::StatusCode;
use ping_proto::types::{ClientId, MessageRequest};
use ping_relay::client::{ClientError, MessageStream, RelayClient};
use ping_relay::queue::{OverflowPolicy, QueueConfig};
use ping_relay::server;
use ping_relay::service::{RelayService, ServiceConfig};
use tokio::sync::oneshot;

// =============================================================================
// Test helpers
// =============================================================================

struct Relay {
    addr: SocketAddr,
    service: Arc<RelayService>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

async fn start_relay(config: ServiceConfig) -> Relay {
    let service = Arc::new(RelayService::with_config(config));
    let (tx, rx) = oneshot::channel::<()>();
    let (addr, handle) = server::start_server_with_service("127.0.0.1:0", Arc::clone(&service), async {
        let _ = rx.await;
    })
    .await
    .expect("failed to start relay");
    Relay {
        addr,
        service,
        shutdown: Some(tx),
        handle,
    }
}

fn fast_config() -> ServiceConfig {
    ServiceConfig {
        poll_interval: Duration::from_millis(20),
        ..ServiceConfig::default()
    }
}

fn id(name: &str) -> ClientId {
    ClientId::new(name).unwrap()
}

async fn wait_for<F, Fut>(mut check: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn open_stream(relay: &Relay, name: &str) -> MessageStream {
    let client = RelayClient::for_addr(relay.addr);
    let stream = client.receive_messages(name).await.unwrap();
    let service = Arc::clone(&relay.service);
    let client_id = id(name);
    wait_for(
        || {
            let service = Arc::clone(&service);
            let client_id = client_id.clone();
            async move { service.is_connected(&client_id).await }
        },
        "registration",
    )
    .await;
    stream
}

async fn wait_disconnected(service: &Arc<RelayService>, name: &str) {
    let client_id = id(name);
    wait_for(
        || {
            let service = Arc::clone(service);
            let client_id = client_id.clone();
            async move { !service.is_connected(&client_id).await }
        },
        "deregistration",
    )
    .await;
}

fn message(to: &str, text: &str) -> MessageRequest {
    MessageRequest {
        client: "alice".to_string(),
        author: "alice".to_string(),
        recipient: to.to_string(),
        message: text.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn dropped_stream_is_deregistered_with_its_queue() {
    let relay = start_relay(fast_config()).await;
    let bob = open_stream(&relay, "bob").await;
    assert!(relay.service.has_queue(&id("bob")).await);

    // No close handshake: the TCP connection just goes away.
    drop(bob);
    wait_disconnected(&relay.service, "bob").await;
    assert!(!relay.service.has_queue(&id("bob")).await);
}

#[tokio::test]
async fn reconnect_supersedes_previous_stream() {
    let relay = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(relay.addr);

    let mut first = open_stream(&relay, "bob").await;
    let first_conn = relay.service.connection(&id("bob")).await.unwrap().id;

    let mut second = client.receive_messages("bob").await.unwrap();
    let service = Arc::clone(&relay.service);
    wait_for(
        || {
            let service = Arc::clone(&service);
            async move {
                service
                    .connection(&id("bob"))
                    .await
                    .is_some_and(|h| h.id != first_conn)
            }
        },
        "replacement",
    )
    .await;

    // The superseded stream is closed by the relay.
    let ended = tokio::time::timeout(Duration::from_secs(3), first.next())
        .await
        .expect("superseded stream never closed");
    assert!(ended.is_none(), "unexpected frame: {ended:?}");

    assert!(relay.service.is_connected(&id("bob")).await);
    let code = client.send_message(message("bob", "after")).await.unwrap();
    assert!(code.is_success());

    let frame = tokio::time::timeout(Duration::from_secs(3), second.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(frame.message_response.unwrap().content_text(), Some("after"));

    second.close().await;
    wait_disconnected(&relay.service, "bob").await;
}

#[tokio::test]
async fn blank_client_stream_is_rejected() {
    let relay = start_relay(fast_config()).await;
    let client = RelayClient::for_addr(relay.addr);

    let mut stream = client.receive_messages("   ").await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(3), stream.next())
        .await
        .unwrap();
    match first {
        Some(Err(ClientError::Rejected(code))) => {
            assert_eq!(code.status_code(), Some(StatusCode::InvalidRequest));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(relay.service.connected_clients().await.is_empty());
}

#[tokio::test]
async fn full_queue_reports_queue_full() {
    let relay = start_relay(ServiceConfig {
        queue: QueueConfig::new(
            1,
            OverflowPolicy::BlockThenFail {
                wait: Duration::from_millis(20),
            },
        ),
        ..fast_config()
    })
    .await;
    let client = RelayClient::for_addr(relay.addr);

    // Registered without a pump, so nothing drains the queue.
    relay.service.open_connection(&id("bob"), None).await;

    assert!(client.send_message(message("bob", "1")).await.unwrap().is_success());
    let code = client.send_message(message("bob", "2")).await.unwrap();
    assert_eq!(code.status_code(), Some(StatusCode::QueueFull));
}

#[tokio::test]
async fn drop_oldest_keeps_newest_messages() {
    let relay = start_relay(ServiceConfig {
        queue: QueueConfig::new(2, OverflowPolicy::DropOldest),
        ..fast_config()
    })
    .await;
    let client = RelayClient::for_addr(relay.addr);
    relay.service.open_connection(&id("bob"), None).await;

    for text in ["1", "2", "3"] {
        assert!(client.send_message(message("bob", text)).await.unwrap().is_success());
    }
    assert_eq!(relay.service.queue_len(&id("bob")).await, 2);
}

#[tokio::test]
async fn shutdown_closes_streams_and_stops_server() {
    let mut relay = start_relay(fast_config()).await;
    let mut bob = open_stream(&relay, "bob").await;

    relay.shutdown.take().unwrap().send(()).unwrap();

    let ended = tokio::time::timeout(Duration::from_secs(3), bob.next())
        .await
        .expect("stream not closed on shutdown");
    assert!(ended.is_none());
    drop(bob);

    wait_disconnected(&relay.service, "bob").await;
    tokio::time::timeout(Duration::from_secs(5), relay.handle)
        .await
        .expect("server did not stop")
        .unwrap();
}
