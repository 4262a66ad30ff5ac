//! # mcplink-server
//!
//! MCP server host: register tool handlers, serve JSON-RPC over a
//! transport (stdio for local servers), and decode handler output into
//! MCP content parts.
//!
//! ```rust,no_run
//! use mcplink_server::{ServerBuilder, ToolOutput};
//! use mcplink_protocol::{ToolDefinition, ToolKind};
//!
//! # async fn example() -> mcplink_protocol::McpResult<()> {
//! let server = ServerBuilder::new()
//!     .name("time-server")
//!     .version("1.0.0")
//!     .tool(
//!         ToolDefinition {
//!             name: "get_time".to_string(),
//!             description: "Current UTC time".to_string(),
//!             parameters: vec![],
//!             kind: ToolKind::Function,
//!         },
//!         |_args| async move { Ok(ToolOutput::text("12:00Z")) },
//!     )
//!     .build();
//! # Ok(())
//! # }
//! ```

pub mod content;
pub mod host;

pub use content::decode_tool_content;
pub use host::{McpServer, ServerBuilder, ToolHandler, ToolOutput};
