//! The conversational data model shared by the server host, the tool
//! providers, and the orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker role of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user input
    User,
    /// Model output
    Assistant,
    /// Tool result fed back to the model
    Tool,
    /// System instruction
    System,
}

/// An inline image attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Base64-encoded image bytes
    pub data: String,
    /// Image MIME type
    pub mime_type: String,
}

/// A file referenced from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReference {
    /// Where the file lives
    pub url: String,
    /// Display name
    pub name: String,
}

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier
    pub id: String,
    /// Speaker role
    pub role: Role,
    /// Textual content
    pub content: String,
    /// Tool calls requested by an assistant message, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-role messages: the id of the call being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Inline images
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageContent>,
    /// File references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReference>,
}

impl Message {
    /// A user message with fresh identity.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::plain(id, Role::User, content)
    }

    /// An assistant message.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::plain(id, Role::Assistant, content)
    }

    /// A system message.
    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::plain(id, Role::System, content)
    }

    /// A tool-role message answering `tool_call_id`.
    pub fn tool(
        id: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        let mut message = Self::plain(id, Role::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    fn plain(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            images: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// Structured arguments
    pub arguments: Value,
    /// Call identifier; the orchestrator guarantees presence before dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The outcome of executing a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the call succeeded
    pub success: bool,
    /// Textual content for the model
    pub content: String,
    /// Error description on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured metadata (images, resources, provider extras)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// The id of the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ToolResult {
    /// A successful result.
    pub fn success(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
            metadata: None,
            tool_call_id,
        }
    }

    /// A failed result carrying an error description.
    pub fn failure(error: impl Into<String>, tool_call_id: Option<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            content: error.clone(),
            error: Some(error),
            metadata: None,
            tool_call_id,
        }
    }
}

/// What kind of provider serves a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolKind {
    /// In-process function
    Function,
    /// Tool on an MCP server
    McpTool,
    /// Remote A2A agent
    A2aAgent,
}

/// A parameter accepted by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Type as a string ("string", "number", ...)
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether the parameter must be supplied
    pub required: bool,
}

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Typed parameters
    pub parameters: Vec<ToolParameter>,
    /// Provider kind
    pub kind: ToolKind,
}

impl ToolDefinition {
    /// Render the parameter list as a JSON Schema object, the shape MCP
    /// servers advertise in `tools/list`.
    pub fn input_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.type_name,
                        "description": p.description,
                    }),
                )
            })
            .collect();

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
