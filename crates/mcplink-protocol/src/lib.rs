//! # mcplink-protocol
//!
//! JSON-RPC 2.0 envelope types and MCP wire shapes shared by every other
//! mcplink crate. This crate is the foundation layer: it has no I/O, no
//! async, and no transport knowledge.

pub mod error;
pub mod jsonrpc;
pub mod model;
pub mod types;

pub use error::{McpError, McpResult};
pub use model::{
    FileReference, ImageContent, Message, Role, ToolCall, ToolDefinition, ToolKind,
    ToolParameter, ToolResult,
};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, MessageId, ResponseId,
};
pub use types::{
    CallToolResult, ClientCapabilities, ContentPart, Implementation, InitializeRequest,
    InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult, Prompt,
    PromptArgument, ReadResourceResult, ResourceContents, ResourceDescriptor, ServerCapabilities,
    ToolDescriptor,
};

/// MCP protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Maximum serialized message size accepted by transports (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
