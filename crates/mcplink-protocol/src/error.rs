//! Protocol-level error type shared by the client and the orchestrator.

use thiserror::Error;

use crate::jsonrpc::MessageId;

/// A specialized `Result` for protocol operations.
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Errors raised by the MCP client, the server host, and the orchestrator.
///
/// Transport- and auth-layer failures are converted into the `Transport`
/// and `Authentication` variants at the crate boundary so that callers see
/// a single error type per operation.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum McpError {
    /// Operation attempted before the connection was established.
    #[error("Not connected")]
    NotConnected,

    /// Server and client disagree on the protocol version.
    #[error("Protocol mismatch: client speaks {client}, server answered {server}")]
    ProtocolMismatch {
        /// Version the client offered
        client: String,
        /// Version the server answered with
        server: String,
    },

    /// The peer answered with a JSON-RPC error object.
    #[error("Remote error {code}: {message}")]
    RemoteError {
        /// JSON-RPC error code
        code: i32,
        /// JSON-RPC error message
        message: String,
    },

    /// A request did not complete within its timeout.
    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    /// A response arrived whose id matches no outstanding request.
    #[error("Unknown response id: {0}")]
    UnknownResponseId(MessageId),

    /// The peer's bytes did not decode into the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization or deserialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Underlying transport failure, stringly carried across the boundary.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Underlying authentication failure.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The agentic loop hit its iteration cap.
    #[error("Maximum agentic iterations reached ({0})")]
    MaxIterationsReached(usize),

    /// No tool provider claims the requested tool.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The language model invocation failed.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Anything that does not fit the kinds above.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Remote error from a JSON-RPC error object.
    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        Self::RemoteError {
            code,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            McpError::rpc(-32601, "Method not found").to_string(),
            "Remote error -32601: Method not found"
        );
        assert_eq!(
            McpError::UnknownResponseId(MessageId::from(9i64)).to_string(),
            "Unknown response id: 9"
        );
        assert_eq!(
            McpError::ToolNotFound("get_time".to_string()).to_string(),
            "Tool not found: get_time"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert!(matches!(McpError::from(err), McpError::Serialization(_)));
    }
}
