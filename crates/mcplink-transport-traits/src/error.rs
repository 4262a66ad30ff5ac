//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// Operation attempted on a transport that is not connected.
    #[error("Transport not connected")]
    NotConnected,

    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A network-level failure (DNS, socket, TLS) below the protocol.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a message.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Failed to serialize or deserialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The peer's response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The peer answered with an HTTP error status.
    #[error("Server error {code}: {body}")]
    ServerError {
        /// HTTP status code
        code: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// A malformed endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A protocol-level error occurred.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Connection establishment timed out.
    #[error("Connection timed out after {timeout:?}")]
    ConnectionTimeout {
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// A single request timed out.
    #[error("Request timed out after {timeout:?} for operation: {operation}")]
    RequestTimeout {
        /// The operation that timed out
        operation: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// Authentication with the remote endpoint failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A 401 challenge carried a `resource_metadata` URL; the caller can
    /// recover by running OAuth discovery against it.
    #[error("OAuth discovery required: {0}")]
    OAuthDiscoveryRequired(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

impl From<TransportError> for mcplink_protocol::McpError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => mcplink_protocol::McpError::NotConnected,
            TransportError::RequestTimeout { operation, timeout } => {
                mcplink_protocol::McpError::RequestTimeout(format!(
                    "{operation} after {timeout:?}"
                ))
            }
            TransportError::AuthenticationFailed(reason) => {
                mcplink_protocol::McpError::Authentication(reason)
            }
            TransportError::OAuthDiscoveryRequired(url) => {
                mcplink_protocol::McpError::Authentication(format!(
                    "OAuth discovery required: {url}"
                ))
            }
            other => mcplink_protocol::McpError::Transport(other.to_string()),
        }
    }
}
