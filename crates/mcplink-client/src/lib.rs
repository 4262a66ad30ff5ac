//! # mcplink-client
//!
//! MCP client: JSON-RPC 2.0 request/response correlation over any
//! [`Transport`](mcplink_transport_traits::Transport), the `initialize`
//! handshake with protocol-version validation, and typed wrappers for the
//! tool, resource, and prompt operations.
//!
//! ```rust,no_run
//! use mcplink_client::Client;
//! use mcplink_stdio::{StdioServerConfig, StdioTransport};
//! use std::collections::HashMap;
//!
//! # async fn example() -> mcplink_protocol::McpResult<()> {
//! let config = StdioServerConfig {
//!     name: "files".to_string(),
//!     command: "/usr/local/bin/file-server".to_string(),
//!     args: vec![],
//!     env: HashMap::new(),
//! };
//! let mut client = Client::new(StdioTransport::new(config, HashMap::new()));
//! let init = client.initialize().await?;
//! println!("Connected to {}", init.server_info.name);
//!
//! let tools = client.list_tools().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod protocol;

pub use config::ClientConfig;
pub use core::{Client, ClientState};
