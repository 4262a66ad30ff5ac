//! Tool providers and the aggregating manager.

mod function;
mod manager;
mod mcp;

pub use function::FunctionToolProvider;
pub use manager::ToolManager;
pub use mcp::McpToolProvider;

use async_trait::async_trait;

use mcplink_protocol::{FileReference, ImageContent, McpResult, ToolCall, ToolDefinition, ToolResult};

/// Something that serves tools: an MCP server, an A2A agent, or a bag of
/// in-process functions. Consumers see only this surface.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// The tools this provider serves.
    async fn available_tools(&self) -> Vec<ToolDefinition>;

    /// Whether this provider serves `name`.
    async fn claims(&self, name: &str) -> bool {
        self.available_tools()
            .await
            .iter()
            .any(|tool| tool.name == name)
    }

    /// Execute one call.
    ///
    /// Tool-level failures come back as failure [`ToolResult`]s; an `Err`
    /// means the provider itself broke (connection lost, protocol error).
    async fn execute(&self, call: &ToolCall) -> McpResult<ToolResult>;
}

/// Structured attachments a provider can smuggle through
/// [`ToolResult::metadata`]: inline images and file references the
/// orchestrator lifts onto the tool message.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolAttachments {
    /// Inline images
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageContent>,
    /// File references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReference>,
}

impl ToolAttachments {
    /// Whether there is anything to attach.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.files.is_empty()
    }

    /// Read attachments out of a result's metadata, tolerating absence.
    pub fn from_result(result: &ToolResult) -> Self {
        result
            .metadata
            .as_ref()
            .and_then(|metadata| serde_json::from_value(metadata.clone()).ok())
            .unwrap_or_default()
    }

    /// Store these attachments into metadata form.
    pub fn into_metadata(self) -> Option<serde_json::Value> {
        if self.is_empty() {
            None
        } else {
            serde_json::to_value(self).ok()
        }
    }
}
