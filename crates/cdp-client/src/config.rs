//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-command response window in milliseconds.
    pub command_timeout_ms: u64,
    /// Capacity of the inbound message channel between the transport reader
    /// and the dispatch loop.
    pub event_buffer: usize,
    /// Base URL of the target directory service.
    pub http_endpoint: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            event_buffer: 512,
            http_endpoint: "http://127.0.0.1:9222".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
