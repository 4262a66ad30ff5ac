//! # mcplink-agent
//!
//! The agentic layer: a [`LanguageModel`] capability interface, tool
//! providers (in-process functions, MCP servers, A2A agents) aggregated
//! behind a [`ToolManager`], and the [`Orchestrator`] loop that drives a
//! conversation — model output in, tool results back, iterate until the
//! model answers without tool calls or the iteration cap is reached.

pub mod a2a;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod tools;

pub use a2a::{A2aAgentProvider, A2aMessageSender, AgentCard, TaskState, TaskStore};
pub use config::OrchestratorConfig;
pub use llm::{LanguageModel, LlmRequest, LlmResponse, LlmStreamChunk};
pub use orchestrator::{AgentEvent, Orchestrator};
pub use tools::{FunctionToolProvider, McpToolProvider, ToolManager, ToolProvider};
