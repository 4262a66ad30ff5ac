//! The server host: tool registry and the JSON-RPC serve loop.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use mcplink_protocol::{
    CallToolResult, Implementation, InitializeResult, JsonRpcError, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpError, McpResult, MessageId,
    PROTOCOL_VERSION, ServerCapabilities, ToolDefinition, ToolDescriptor,
};
use mcplink_transport_traits::{Transport, TransportMessage};

use crate::content::decode_tool_content;

/// What a tool handler hands back to the host.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Plain text success
    Text(String),
    /// Plain text failure (`isError: true` on the wire)
    Error(String),
    /// Raw content value, decoded via [`decode_tool_content`]
    Content(Value),
}

impl ToolOutput {
    /// Text success.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Text failure.
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error(error.into())
    }

    /// Structured content (typically an array of content parts).
    pub fn content(value: Value) -> Self {
        Self::Content(value)
    }
}

/// Boxed async tool handler.
pub type ToolHandler = Arc<
    dyn Fn(HashMap<String, Value>) -> Pin<Box<dyn Future<Output = McpResult<ToolOutput>> + Send>>
        + Send
        + Sync,
>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Builder for [`McpServer`].
pub struct ServerBuilder {
    name: String,
    version: String,
    tools: Vec<RegisteredTool>,
}

impl ServerBuilder {
    /// Start a builder with placeholder identity.
    pub fn new() -> Self {
        Self {
            name: "mcplink-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools: Vec::new(),
        }
    }

    /// Server name reported during `initialize`.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Server version reported during `initialize`.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Register a tool. Later registrations under the same name replace
    /// earlier ones.
    #[must_use]
    pub fn tool<F, Fut>(mut self, definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(HashMap<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<ToolOutput>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.tools.retain(|t| t.definition.name != definition.name);
        self.tools.push(RegisteredTool {
            definition,
            handler,
        });
        self
    }

    /// Finish the builder.
    pub fn build(self) -> McpServer {
        McpServer {
            info: Implementation {
                name: self.name,
                version: self.version,
            },
            tools: self.tools,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An MCP server host: a tool registry served over a transport.
pub struct McpServer {
    info: Implementation,
    tools: Vec<RegisteredTool>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl McpServer {
    /// Names of the registered tools, in registration order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.definition.name.as_str()).collect()
    }

    /// Serve requests from `transport` until its stream ends.
    ///
    /// The transport is connected first; requests are handled in arrival
    /// order and each response is written back before the next request is
    /// read.
    pub async fn serve<T: Transport>(&self, transport: &T) -> McpResult<()> {
        transport.connect().await.map_err(McpError::from)?;
        debug!(server = %self.info.name, "Serving MCP requests");

        loop {
            let message = match transport.receive().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("Client stream ended");
                    return Ok(());
                }
                Err(e) => return Err(McpError::from(e)),
            };

            let parsed = match JsonRpcMessage::parse_many(&message.payload) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable request payload");
                    continue;
                }
            };

            for item in parsed {
                match item {
                    JsonRpcMessage::Request(request) => {
                        let response = self.handle_request(request).await;
                        let payload = serde_json::to_vec(&response)?;
                        transport
                            .send(TransportMessage::new(
                                MessageId::from("response"),
                                Bytes::from(payload),
                            ))
                            .await
                            .map_err(McpError::from)?;
                    }
                    JsonRpcMessage::Notification(notification) => {
                        debug!(method = %notification.method, "Client notification");
                    }
                    JsonRpcMessage::Response(_) => {
                        warn!("Ignoring unexpected response frame on server transport");
                    }
                }
            }
        }
    }

    /// Handle one request and produce its response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(serde_json::json!({})),
                        ..Default::default()
                    },
                    server_info: self.info.clone(),
                };
                JsonRpcResponse::success(
                    serde_json::to_value(result).expect("initialize result serializes"),
                    id,
                )
            }
            "ping" => JsonRpcResponse::success(serde_json::json!({}), id),
            "tools/list" => {
                let result = ListToolsResult {
                    tools: self
                        .tools
                        .iter()
                        .map(|t| ToolDescriptor {
                            name: t.definition.name.clone(),
                            description: Some(t.definition.description.clone()),
                            input_schema: t.definition.input_schema(),
                        })
                        .collect(),
                };
                JsonRpcResponse::success(
                    serde_json::to_value(result).expect("tool list serializes"),
                    id,
                )
            }
            "tools/call" => self.handle_tool_call(request.params, id).await,
            "resources/list" => {
                JsonRpcResponse::success(serde_json::json!({"resources": []}), id)
            }
            "prompts/list" => JsonRpcResponse::success(serde_json::json!({"prompts": []}), id),
            other => {
                JsonRpcResponse::error_response(JsonRpcError::method_not_found(other), id)
            }
        }
    }

    async fn handle_tool_call(&self, params: Option<Value>, id: MessageId) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error_response(
                JsonRpcError::invalid_params("tools/call requires params"),
                id,
            );
        };

        let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::error_response(
                JsonRpcError::invalid_params("tools/call requires a tool name"),
                id,
            );
        };

        let arguments: HashMap<String, Value> = params
            .get("arguments")
            .and_then(|a| a.as_object())
            .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let Some(tool) = self.tools.iter().find(|t| t.definition.name == name) else {
            return JsonRpcResponse::error_response(
                JsonRpcError::invalid_params(format!("Unknown tool: {name}")),
                id,
            );
        };

        match (tool.handler)(arguments).await {
            Ok(output) => {
                let result = Self::tool_output_to_result(output);
                JsonRpcResponse::success(
                    serde_json::to_value(result).expect("tool result serializes"),
                    id,
                )
            }
            Err(e) => JsonRpcResponse::error_response(
                JsonRpcError::internal(format!("Tool handler failed: {e}")),
                id,
            ),
        }
    }

    fn tool_output_to_result(output: ToolOutput) -> CallToolResult {
        match output {
            ToolOutput::Text(text) => CallToolResult {
                content: vec![mcplink_protocol::ContentPart::text(text)],
                is_error: Some(false),
            },
            ToolOutput::Error(error) => CallToolResult {
                content: vec![mcplink_protocol::ContentPart::text(error)],
                is_error: Some(true),
            },
            ToolOutput::Content(value) => CallToolResult {
                content: decode_tool_content(&value),
                is_error: Some(false),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcplink_protocol::{ContentPart, ToolKind, ToolParameter};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn time_definition() -> ToolDefinition {
        ToolDefinition {
            name: "get_time".to_string(),
            description: "Current UTC time".to_string(),
            parameters: vec![],
            kind: ToolKind::Function,
        }
    }

    fn test_server() -> McpServer {
        ServerBuilder::new()
            .name("test-server")
            .version("0.1.0")
            .tool(time_definition(), |_args| async move {
                Ok(ToolOutput::text("12:00Z"))
            })
            .tool(
                ToolDefinition {
                    name: "echo".to_string(),
                    description: "Echo an argument".to_string(),
                    parameters: vec![ToolParameter {
                        name: "value".to_string(),
                        description: "What to echo".to_string(),
                        type_name: "string".to_string(),
                        required: true,
                    }],
                    kind: ToolKind::Function,
                },
                |args| async move {
                    match args.get("value").and_then(|v| v.as_str()) {
                        Some(value) => Ok(ToolOutput::text(value.to_string())),
                        None => Ok(ToolOutput::error("missing value")),
                    }
                },
            )
            .tool(
                ToolDefinition {
                    name: "screenshot".to_string(),
                    description: "Return mixed content".to_string(),
                    parameters: vec![],
                    kind: ToolKind::Function,
                },
                |_args| async move {
                    Ok(ToolOutput::content(json!([
                        {"type": "text", "text": "captured"},
                        {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                        {"type": "bogus"},
                    ])))
                },
            )
            .build()
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(1i64, method, params)
    }

    #[tokio::test]
    async fn test_initialize_reports_identity_and_tools_capability() {
        let server = test_server();
        let response = server.handle_request(request("initialize", None)).await;
        let result = response.result().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "test-server");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_carries_schemas() {
        let server = test_server();
        let response = server.handle_request(request("tools/list", None)).await;
        let result = response.result().unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[1]["name"], "echo");
        assert_eq!(tools[1]["inputSchema"]["required"][0], "value");
    }

    #[tokio::test]
    async fn test_tool_call_text_output() {
        let server = test_server();
        let response = server
            .handle_request(request("tools/call", Some(json!({"name": "get_time"}))))
            .await;
        let result: CallToolResult =
            serde_json::from_value(response.result().unwrap().clone()).unwrap();
        assert_eq!(result.content, vec![ContentPart::text("12:00Z")]);
        assert_eq!(result.is_error, Some(false));
    }

    #[tokio::test]
    async fn test_tool_call_error_output_flagged() {
        let server = test_server();
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "echo", "arguments": {}})),
            ))
            .await;
        let result: CallToolResult =
            serde_json::from_value(response.result().unwrap().clone()).unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_tool_call_mixed_content_filters_invalid() {
        let server = test_server();
        let response = server
            .handle_request(request("tools/call", Some(json!({"name": "screenshot"}))))
            .await;
        let result: CallToolResult =
            serde_json::from_value(response.result().unwrap().clone()).unwrap();
        assert_eq!(result.content.len(), 2);
        assert!(matches!(result.content[1], ContentPart::Image { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let server = test_server();
        let response = server
            .handle_request(request("tools/call", Some(json!({"name": "nope"}))))
            .await;
        assert_eq!(response.error().unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_unknown_method_not_found() {
        let server = test_server();
        let response = server.handle_request(request("sampling/create", None)).await;
        assert_eq!(response.error().unwrap().code, -32601);
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let server = ServerBuilder::new()
            .tool(time_definition(), |_| async { Ok(ToolOutput::text("a")) })
            .tool(time_definition(), |_| async { Ok(ToolOutput::text("b")) })
            .build();
        assert_eq!(server.tool_names(), vec!["get_time"]);
    }
}
