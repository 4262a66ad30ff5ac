//! Transport configuration and lifecycle types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The kind of transport carrying MCP traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Child-process stdin/stdout pipes
    Stdio,
    /// HTTP request/response plus SSE streaming
    Http,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Lifecycle state of a transport.
///
/// Transports are created `Disconnected`, move through `Connecting` to
/// `Connected`, and end in `Disconnected` or `Failed`. `Failed` is
/// terminal: subsequent sends fail without retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    /// Not yet connected, or cleanly disconnected
    Disconnected,
    /// Connection establishment in progress
    Connecting,
    /// Ready for send/receive
    Connected,
    /// Disconnect in progress
    Disconnecting,
    /// Terminal failure
    Failed {
        /// Human-readable failure description
        reason: String,
    },
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Transport kind this configuration applies to
    pub transport_type: TransportType,
    /// Bounds the connection handshake (default 30 s)
    pub connect_timeout: Duration,
    /// Bounds each RPC after the handshake (default 60 s)
    pub request_timeout: Duration,
    /// Bounds retry loops on retryable failures (default 3)
    pub max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport_type: TransportType::Stdio,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}
