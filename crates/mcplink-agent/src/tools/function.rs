//! In-process function tools.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use mcplink_protocol::{McpResult, ToolCall, ToolDefinition, ToolResult};

use super::ToolProvider;

type FunctionHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = McpResult<String>> + Send>> + Send + Sync>;

/// A provider backed by registered async closures.
///
/// Handlers take the call's argument object and return text; failures are
/// reported as failure results, not errors, so the model sees them.
#[derive(Clone, Default)]
pub struct FunctionToolProvider {
    functions: HashMap<String, (ToolDefinition, FunctionHandler)>,
}

impl std::fmt::Debug for FunctionToolProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionToolProvider")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionToolProvider {
    /// An empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its definition's name.
    #[must_use]
    pub fn function<F, Fut>(mut self, definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<String>> + Send + 'static,
    {
        let handler: FunctionHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.functions
            .insert(definition.name.clone(), (definition, handler));
        self
    }
}

#[async_trait]
impl ToolProvider for FunctionToolProvider {
    async fn available_tools(&self) -> Vec<ToolDefinition> {
        self.functions.values().map(|(d, _)| d.clone()).collect()
    }

    async fn claims(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    async fn execute(&self, call: &ToolCall) -> McpResult<ToolResult> {
        let Some((_, handler)) = self.functions.get(&call.name) else {
            return Ok(ToolResult::failure(
                format!("Tool not found: {}", call.name),
                call.id.clone(),
            ));
        };

        match handler(call.arguments.clone()).await {
            Ok(content) => Ok(ToolResult::success(content, call.id.clone())),
            Err(e) => Ok(ToolResult::failure(e.to_string(), call.id.clone())),
        }
    }
}
