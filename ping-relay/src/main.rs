//! Ping relay hub binary.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:50051
//! cargo run --bin ping-relay
//!
//! # Run on custom address with a small, lossy queue
//! cargo run --bin ping-relay -- --bind 127.0.0.1:8080 --queue-capacity 16 --overflow-policy drop-oldest
//!
//! # Or via environment variables
//! PING_RELAY_ADDR=127.0.0.1:8080 PING_LOG=debug cargo run --bin ping-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use ping_relay::config::{RelayCliArgs, RelayConfig};
use ping_relay::server;
use ping_relay::service::RelayService;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let service_config = config.service_config();
    tracing::info!(
        addr = %config.bind_addr,
        queue_capacity = service_config.queue.capacity,
        overflow = ?service_config.queue.overflow,
        max_payload_size = service_config.max_payload_size,
        "starting ping relay"
    );

    let service = Arc::new(RelayService::with_config(service_config));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown requested");
    };

    match server::start_server_with_service(&config.bind_addr, service, shutdown).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
            tracing::info!("relay stopped");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay");
            std::process::exit(1);
        }
    }
}
