//! Agent-to-Agent (A2A) support: the agent-card shape, task store
//! semantics, and the adapter that turns a remote agent into a callable
//! tool. HTTP routing for serving A2A is a host concern and lives
//! elsewhere; this module is the contract both sides share.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use mcplink_protocol::{McpError, McpResult, ToolCall, ToolDefinition, ToolKind, ToolParameter, ToolResult};

use crate::tools::ToolProvider;

/// A remote agent's self-description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    /// Agent name
    pub name: String,
    /// What the agent does
    pub description: String,
    /// Base URL of the agent's A2A endpoint
    pub url: String,
    /// Agent version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl AgentCard {
    /// The tool name this agent is exposed under: lowercased, with every
    /// non-alphanumeric run collapsed to one underscore.
    pub fn tool_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len());
        let mut last_was_sep = true;
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                out.push(c.to_ascii_lowercase());
                last_was_sep = false;
            } else if !last_was_sep {
                out.push('_');
                last_was_sep = true;
            }
        }
        out.trim_end_matches('_').to_string()
    }
}

/// Lifecycle of an A2A task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Accepted, not yet started
    Submitted,
    /// In progress
    Working,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled by the requester
    Canceled,
}

impl TaskState {
    /// Whether the state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Submitted => matches!(next, Self::Working | Self::Canceled | Self::Failed),
            Self::Working => next.is_terminal(),
            _ => false,
        }
    }
}

/// One task tracked by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aTask {
    /// Task id
    pub id: String,
    /// Current state
    pub state: TaskState,
    /// The message that started the task
    pub message: String,
    /// Artifacts produced so far
    pub artifacts: Vec<String>,
}

/// In-memory task store.
///
/// Tasks enter as `submitted`; transitions are validated, and terminal
/// tasks are immutable.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: DashMap<String, A2aTask>,
}

impl TaskStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a task for `message`; returns it in the `submitted` state.
    pub fn create(&self, message: impl Into<String>) -> A2aTask {
        let task = A2aTask {
            id: Uuid::new_v4().to_string(),
            state: TaskState::Submitted,
            message: message.into(),
            artifacts: Vec::new(),
        };
        self.tasks.insert(task.id.clone(), task.clone());
        task
    }

    /// Look up a task.
    pub fn get(&self, id: &str) -> Option<A2aTask> {
        self.tasks.get(id).map(|t| t.clone())
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Transition a task, enforcing lifecycle legality.
    pub fn transition(&self, id: &str, next: TaskState) -> McpResult<()> {
        let mut task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| McpError::Internal(format!("Unknown task: {id}")))?;

        if !task.state.can_transition_to(next) {
            return Err(McpError::Internal(format!(
                "Illegal task transition {:?} -> {next:?}",
                task.state
            )));
        }

        debug!(task = %id, from = ?task.state, to = ?next, "Task transition");
        task.state = next;
        Ok(())
    }

    /// Append an artifact to a non-terminal task.
    pub fn add_artifact(&self, id: &str, artifact: impl Into<String>) -> McpResult<()> {
        let mut task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| McpError::Internal(format!("Unknown task: {id}")))?;

        if task.state.is_terminal() {
            return Err(McpError::Internal(
                "Cannot add artifacts to a terminal task".to_string(),
            ));
        }
        task.artifacts.push(artifact.into());
        Ok(())
    }
}

/// Sends one message to a remote agent and returns its reply text.
///
/// The concrete wire (JSON-RPC `message/send` over HTTP) is a transport
/// concern; orchestration only needs this seam.
#[async_trait]
pub trait A2aMessageSender: Send + Sync {
    /// Deliver `text` to the agent behind `card`; return the reply.
    async fn send_message(&self, card: &AgentCard, text: &str) -> McpResult<String>;
}

/// Exposes one remote agent as a single callable tool.
pub struct A2aAgentProvider {
    card: AgentCard,
    sender: Arc<dyn A2aMessageSender>,
    store: Arc<TaskStore>,
}

impl std::fmt::Debug for A2aAgentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aAgentProvider")
            .field("card", &self.card)
            .finish()
    }
}

impl A2aAgentProvider {
    /// Provider for `card`, tracking work in `store`.
    pub fn new(card: AgentCard, sender: Arc<dyn A2aMessageSender>, store: Arc<TaskStore>) -> Self {
        Self {
            card,
            sender,
            store,
        }
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.card.tool_name(),
            description: self.card.description.clone(),
            parameters: vec![ToolParameter {
                name: "message".to_string(),
                description: "The message to send to the agent".to_string(),
                type_name: "string".to_string(),
                required: true,
            }],
            kind: ToolKind::A2aAgent,
        }
    }
}

#[async_trait]
impl ToolProvider for A2aAgentProvider {
    async fn available_tools(&self) -> Vec<ToolDefinition> {
        vec![self.definition()]
    }

    async fn claims(&self, name: &str) -> bool {
        name == self.card.tool_name()
    }

    async fn execute(&self, call: &ToolCall) -> McpResult<ToolResult> {
        let message = call
            .arguments
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        if message.is_empty() {
            return Ok(ToolResult::failure(
                "A2A call requires a non-empty 'message' argument",
                call.id.clone(),
            ));
        }

        let task = self.store.create(&message);
        self.store.transition(&task.id, TaskState::Working)?;

        match self.sender.send_message(&self.card, &message).await {
            Ok(reply) => {
                self.store.add_artifact(&task.id, &reply)?;
                self.store.transition(&task.id, TaskState::Completed)?;
                Ok(ToolResult::success(reply, call.id.clone()))
            }
            Err(e) => {
                self.store.transition(&task.id, TaskState::Failed)?;
                Ok(ToolResult::failure(
                    format!("Agent {} failed: {e}", self.card.name),
                    call.id.clone(),
                ))
            }
        }
    }
}
