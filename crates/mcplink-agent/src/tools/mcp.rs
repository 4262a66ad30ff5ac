//! MCP servers as tool providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use mcplink_client::Client;
use mcplink_protocol::{
    ContentPart, FileReference, ImageContent, McpResult, ToolCall, ToolDefinition, ToolKind,
    ToolParameter, ToolResult,
};
use mcplink_transport_traits::Transport;

use super::{ToolAttachments, ToolProvider};

/// Adapts an initialized [`Client`] into a [`ToolProvider`].
///
/// The server's `tools/list` is fetched once and cached; call
/// [`refresh_tools`](Self::refresh_tools) after a `tools/list_changed`
/// notification.
pub struct McpToolProvider<T: Transport> {
    client: Arc<Client<T>>,
    cached: RwLock<Option<Vec<ToolDefinition>>>,
}

impl<T: Transport> std::fmt::Debug for McpToolProvider<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolProvider").finish()
    }
}

impl<T: Transport + 'static> McpToolProvider<T> {
    /// Wrap an initialized client.
    pub fn new(client: Arc<Client<T>>) -> Self {
        Self {
            client,
            cached: RwLock::new(None),
        }
    }

    /// Drop the cached listing; the next call re-fetches.
    pub async fn refresh_tools(&self) {
        *self.cached.write().await = None;
    }

    async fn fetch_tools(&self) -> McpResult<Vec<ToolDefinition>> {
        let listed = self.client.list_tools().await?;
        Ok(listed
            .tools
            .into_iter()
            .map(|tool| {
                let parameters = parameters_from_schema(&tool.input_schema);
                ToolDefinition {
                    name: tool.name,
                    description: tool.description.unwrap_or_default(),
                    parameters,
                    kind: ToolKind::McpTool,
                }
            })
            .collect())
    }
}

/// Flatten a JSON Schema object into the typed parameter list.
fn parameters_from_schema(schema: &serde_json::Value) -> Vec<ToolParameter> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    schema
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|properties| {
            properties
                .iter()
                .map(|(name, spec)| ToolParameter {
                    name: name.clone(),
                    description: spec
                        .get("description")
                        .and_then(|d| d.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    type_name: spec
                        .get("type")
                        .and_then(|t| t.as_str())
                        .unwrap_or("string")
                        .to_string(),
                    required: required.contains(&name.as_str()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Fold a tool call's content parts into text + attachments.
fn fold_content(parts: &[ContentPart]) -> (String, ToolAttachments) {
    let mut text_parts = Vec::new();
    let mut attachments = ToolAttachments::default();

    for part in parts {
        match part {
            ContentPart::Text { text } => text_parts.push(text.clone()),
            ContentPart::Image {
                data, mime_type, ..
            } => attachments.images.push(ImageContent {
                data: data.clone(),
                mime_type: mime_type.clone(),
            }),
            ContentPart::Resource { resource } => attachments.files.push(FileReference {
                url: resource.uri.clone(),
                name: resource
                    .name
                    .clone()
                    .unwrap_or_else(|| resource.uri.clone()),
            }),
        }
    }

    (text_parts.join("\n"), attachments)
}

#[async_trait]
impl<T: Transport + 'static> ToolProvider for McpToolProvider<T> {
    async fn available_tools(&self) -> Vec<ToolDefinition> {
        if let Some(cached) = self.cached.read().await.clone() {
            return cached;
        }

        match self.fetch_tools().await {
            Ok(tools) => {
                *self.cached.write().await = Some(tools.clone());
                tools
            }
            Err(e) => {
                warn!(error = %e, "tools/list failed; advertising no tools");
                Vec::new()
            }
        }
    }

    async fn execute(&self, call: &ToolCall) -> McpResult<ToolResult> {
        let arguments: Option<HashMap<String, serde_json::Value>> = call
            .arguments
            .as_object()
            .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        let outcome = self.client.call_tool(&call.name, arguments).await?;
        let (text, attachments) = fold_content(&outcome.content);

        let mut result = if outcome.is_error.unwrap_or(false) {
            ToolResult::failure(text, call.id.clone())
        } else {
            ToolResult::success(text, call.id.clone())
        };
        result.metadata = attachments.into_metadata();
        Ok(result)
    }
}
