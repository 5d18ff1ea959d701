//! Health check types.

use std::time::Duration;

/// Health of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the client holds a connection.
    pub connected: bool,
    /// Round trip of a ping, when one succeeded.
    pub latency: Option<Duration>,
}

impl HealthStatus {
    /// Status of a client with no connection.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            latency: None,
        }
    }

    /// Connected and the broker answered a ping.
    pub fn is_healthy(&self) -> bool {
        self.connected && self.latency.is_some()
    }
}
