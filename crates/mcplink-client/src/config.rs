//! Client configuration.

use std::time::Duration;

use mcplink_protocol::Implementation;

/// Configuration for [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client identification sent during `initialize`
    pub client_info: Implementation,
    /// Bounds the initialize handshake (default 30 s)
    pub connect_timeout: Duration,
    /// Bounds each subsequent RPC (default 60 s)
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation {
                name: "mcplink-client".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}
