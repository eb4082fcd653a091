use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ReconnectPolicy;

/// Root configuration for the live updates core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveConfigFile {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Push endpoint (STOMP over WebSocket)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// WebSocket URL, `ws://` or `wss://`
    #[serde(default = "default_url")]
    pub url: String,
    /// STOMP `host` header; defaults to the URL host
    #[serde(default)]
    pub host: Option<String>,
    /// Heart-beat interval we offer and request; 0 disables heart-beats
    #[serde(default)]
    pub heartbeat_ms: u64,
    /// Time allowed for the socket open plus STOMP handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            url: default_url(),
            host: None,
            heartbeat_ms: 0,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl EndpointConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Fixed,
    Exponential,
}

/// Reconnection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    /// Fixed delay, or the initial delay for exponential backoff
    #[serde(default = "default_reconnect_delay")]
    pub delay_ms: u64,
    /// Upper bound for exponential backoff
    #[serde(default = "default_max_reconnect_delay")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            policy: PolicyKind::default(),
            delay_ms: default_reconnect_delay(),
            max_delay_ms: default_max_reconnect_delay(),
        }
    }
}

impl ReconnectConfig {
    pub fn to_policy(&self) -> ReconnectPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        match self.policy {
            PolicyKind::Fixed => ReconnectPolicy::Fixed(delay),
            PolicyKind::Exponential => ReconnectPolicy::Exponential {
                initial: delay,
                max: Duration::from_millis(self.max_delay_ms.max(self.delay_ms)),
            },
        }
    }
}

/// History buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            capacity: default_history_capacity(),
        }
    }
}

// Default value functions for serde
fn default_url() -> String {
    "ws://localhost:8080/ws/websocket".to_string()
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_reconnect_delay() -> u64 {
    5_000
}

fn default_max_reconnect_delay() -> u64 {
    30_000
}

fn default_history_capacity() -> usize {
    200
}
