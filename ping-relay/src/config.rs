//! Configuration for the Ping relay hub.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/ping-relay/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

use crate::pump::{DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
use crate::queue::{DEFAULT_ENQUEUE_WAIT, DEFAULT_QUEUE_CAPACITY, OverflowPolicy, QueueConfig};
use crate::service::{DEFAULT_MAX_PAYLOAD_SIZE, ServiceConfig};

/// Default listen address of the hub.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:50051";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// What a full queue does with a new message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowMode {
    /// Hold the sender briefly, then fail with `QueueFull`.
    #[default]
    Block,
    /// Evict the oldest queued message.
    DropOldest,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
    queue_capacity: Option<usize>,
    enqueue_wait_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    overflow_policy: Option<OverflowMode>,
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay hub.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Ping relay hub")]
pub struct RelayCliArgs {
    /// Address to bind the relay to.
    #[arg(short, long, env = "PING_RELAY_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/ping-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum message or key size in bytes.
    #[arg(long, env = "PING_MAX_PAYLOAD_SIZE")]
    pub max_payload_size: Option<usize>,

    /// Messages held per connected client before overflow handling kicks in.
    #[arg(long, env = "PING_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// How long a sender waits on a full queue, in milliseconds.
    #[arg(long, env = "PING_ENQUEUE_WAIT_MS")]
    pub enqueue_wait_ms: Option<u64>,

    /// Upper bound on one queue wait in a stream, in milliseconds.
    #[arg(long, env = "PING_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Behavior when a recipient's queue is full.
    #[arg(long, value_enum, env = "PING_OVERFLOW_POLICY")]
    pub overflow_policy: Option<OverflowMode>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "PING_LOG")]
    pub log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:50051`).
    pub bind_addr: String,
    /// Maximum allowed message or key size in bytes.
    pub max_payload_size: usize,
    /// Slots per recipient queue.
    pub queue_capacity: usize,
    /// Producer wait on a full queue (block mode only).
    pub enqueue_wait: Duration,
    /// Upper bound on a single queue wait inside a stream.
    pub poll_interval: Duration,
    /// Overflow behavior.
    pub overflow_policy: OverflowMode,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_wait: DEFAULT_ENQUEUE_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            overflow_policy: OverflowMode::Block,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();
        let server = &file.server;

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_payload_size: cli
                .max_payload_size
                .or(server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            queue_capacity: cli
                .queue_capacity
                .or(server.queue_capacity)
                .unwrap_or(defaults.queue_capacity),
            enqueue_wait: cli
                .enqueue_wait_ms
                .or(server.enqueue_wait_ms)
                .map_or(defaults.enqueue_wait, Duration::from_millis),
            poll_interval: cli
                .poll_interval_ms
                .or(server.poll_interval_ms)
                .map_or(defaults.poll_interval, Duration::from_millis),
            overflow_policy: cli
                .overflow_policy
                .or(server.overflow_policy)
                .unwrap_or(defaults.overflow_policy),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| server.log_level.clone())
                .unwrap_or(defaults.log_level),
        }
    }

    /// The [`ServiceConfig`] these settings describe.
    ///
    /// A poll interval below [`MIN_POLL_INTERVAL`] is raised to it.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        let overflow = match self.overflow_policy {
            OverflowMode::Block => OverflowPolicy::BlockThenFail {
                wait: self.enqueue_wait,
            },
            OverflowMode::DropOldest => OverflowPolicy::DropOldest,
        };
        ServiceConfig {
            max_payload_size: self.max_payload_size,
            poll_interval: self.poll_interval.max(MIN_POLL_INTERVAL),
            queue: QueueConfig::new(self.queue_capacity, overflow),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(RelayConfigFile::default());
    };
    let path = config_dir.join("ping-relay").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
