//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Parley server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds (server-initiated Ping).
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (close after no Pong for this long).
    pub heartbeat_timeout_secs: u64,
    /// Per-connection outbound buffer (events); senders never block on it.
    pub send_buffer: usize,
    /// Dropped-event budget before a slow client is evicted.
    pub max_send_drops: u64,
    /// Seconds a call may ring before it is marked missed.
    pub ring_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 500,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            send_buffer: 256,
            max_send_drops: 100,
            ring_timeout_secs: 45,
            max_message_size: 64 * 1024, // 64 KB
        }
    }
}

impl ServerConfig {
    /// Apply `PARLEY_*` environment overrides on top of the current values.
    ///
    /// Unset or unparsable variables leave the field unchanged.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("PARLEY_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse("PARLEY_PORT") {
            self.port = port;
        }
        if let Some(max) = env_parse("PARLEY_MAX_CONNECTIONS") {
            self.max_connections = max;
        }
        if let Some(secs) = env_parse("PARLEY_RING_TIMEOUT_SECS") {
            self.ring_timeout_secs = secs;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
