//! The tool manager: provider aggregation and dispatch.

use std::sync::Arc;

use tracing::{debug, warn};

use mcplink_protocol::{ToolCall, ToolDefinition, ToolResult};

use super::ToolProvider;

/// Aggregates providers in configured order.
///
/// `available_tools` concatenates the providers' listings, dropping
/// duplicate names (first provider wins). `execute` routes a call to the
/// first provider that claims the name; an unclaimed name yields a
/// failure result, never an error, so the model gets to react.
#[derive(Clone, Default)]
pub struct ToolManager {
    providers: Vec<Arc<dyn ToolProvider>>,
}

impl std::fmt::Debug for ToolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolManager")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl ToolManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; earlier providers win name conflicts.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Append a provider in place.
    pub fn add_provider(&mut self, provider: Arc<dyn ToolProvider>) {
        self.providers.push(provider);
    }

    /// The deduplicated union of all providers' tools.
    pub async fn available_tools(&self) -> Vec<ToolDefinition> {
        let mut seen = std::collections::HashSet::new();
        let mut tools = Vec::new();

        for provider in &self.providers {
            for tool in provider.available_tools().await {
                if seen.insert(tool.name.clone()) {
                    tools.push(tool);
                } else {
                    debug!(tool = %tool.name, "Duplicate tool name shadowed by earlier provider");
                }
            }
        }
        tools
    }

    /// Execute `call` on the first provider that claims its name.
    ///
    /// Provider-level errors are folded into failure results here: the
    /// orchestrator always gets something it can feed back to the model.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        for provider in &self.providers {
            if !provider.claims(&call.name).await {
                continue;
            }

            return match provider.execute(call).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool provider failed");
                    ToolResult::failure(
                        format!("Tool execution failed: {e}"),
                        call.id.clone(),
                    )
                }
            };
        }

        ToolResult::failure(format!("Tool not found: {}", call.name), call.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionToolProvider;
    use mcplink_protocol::ToolKind;
    use pretty_assertions::assert_eq;

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            parameters: vec![],
            kind: ToolKind::Function,
        }
    }

    fn call(name: &str, id: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: serde_json::json!({}),
            id: Some(id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_first_claiming_provider_wins() {
        let first = FunctionToolProvider::new()
            .function(definition("shared"), |_| async { Ok("from-first".to_string()) });
        let second = FunctionToolProvider::new()
            .function(definition("shared"), |_| async { Ok("from-second".to_string()) })
            .function(definition("only-second"), |_| async { Ok("ok".to_string()) });

        let manager = ToolManager::new()
            .provider(Arc::new(first))
            .provider(Arc::new(second));

        let result = manager.execute(&call("shared", "c1")).await;
        assert_eq!(result.content, "from-first");

        let result = manager.execute(&call("only-second", "c2")).await;
        assert_eq!(result.content, "ok");
    }

    #[tokio::test]
    async fn test_available_tools_dedupes_first_wins() {
        let first = FunctionToolProvider::new()
            .function(definition("shared"), |_| async { Ok(String::new()) });
        let second = FunctionToolProvider::new()
            .function(definition("shared"), |_| async { Ok(String::new()) })
            .function(definition("unique"), |_| async { Ok(String::new()) });

        let manager = ToolManager::new()
            .provider(Arc::new(first))
            .provider(Arc::new(second));

        let tools = manager.available_tools().await;
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["shared", "unique"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failure_result() {
        let manager = ToolManager::new();
        let result = manager.execute(&call("frobnicate", "c9")).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool not found: frobnicate"));
        assert_eq!(result.tool_call_id.as_deref(), Some("c9"));
    }
}
