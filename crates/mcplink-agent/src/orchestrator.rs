//! The agentic loop.
//!
//! Each iteration feeds the conversation and the available tools to the
//! model, surfaces its output on the event stream, executes any requested
//! tool calls, and appends one tool-role message per call. The loop ends
//! when the model answers without tool calls or the iteration cap is hit.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use mcplink_protocol::{McpError, McpResult, Message, ToolCall, ToolDefinition, ToolKind, ToolResult};

use crate::config::OrchestratorConfig;
use crate::llm::{LanguageModel, LlmRequest, LlmResponse};
use crate::tools::{ToolAttachments, ToolManager};

use std::sync::Arc;

/// What the orchestrator emits while running.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A partial text delta (streaming mode only)
    Chunk {
        /// The text delta
        delta: String,
    },
    /// A completed conversation message, in conversation order
    Message(Message),
}

/// Drives a conversation against one model and one tool manager.
pub struct Orchestrator {
    llm: Arc<dyn LanguageModel>,
    tools: ToolManager,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    /// Orchestrator with default configuration.
    pub fn new(llm: Arc<dyn LanguageModel>, tools: ToolManager) -> Self {
        Self::with_config(llm, tools, OrchestratorConfig::default())
    }

    /// Orchestrator with explicit configuration.
    pub fn with_config(
        llm: Arc<dyn LanguageModel>,
        tools: ToolManager,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            llm,
            tools,
            config,
        }
    }

    /// Run the loop over `conversation`, emitting events as they happen.
    ///
    /// Returns the full conversation, which grows by at least one
    /// assistant message per iteration plus one tool message per call.
    /// Cancellation aborts the in-flight model call or tool execution at
    /// the next await point.
    pub async fn run(
        &self,
        mut conversation: Vec<Message>,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> McpResult<Vec<Message>> {
        let offered = self.offered_tools().await;
        debug!(tools = offered.len(), "Starting agentic loop");

        for iteration in 0..self.config.max_agentic_iterations {
            let request = LlmRequest {
                messages: conversation.clone(),
                tools: offered.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                additional_parameters: self.config.additional_parameters.clone(),
            };

            let response = tokio::select! {
                response = self.invoke_llm(request, &events) => response,
                () = cancel.cancelled() => return Err(McpError::Cancelled),
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let failure = Message::assistant(
                        fresh_id(),
                        format!("The model invocation failed: {e}"),
                    );
                    let _ = events.send(AgentEvent::Message(failure.clone())).await;
                    conversation.push(failure);
                    return Err(McpError::Llm(e.to_string()));
                }
            };

            let assistant = Self::assistant_message(response);
            let _ = events.send(AgentEvent::Message(assistant.clone())).await;
            conversation.push(assistant.clone());

            if assistant.tool_calls.is_empty() {
                debug!(iteration, "Model answered without tool calls; loop complete");
                return Ok(conversation);
            }

            for call in &assistant.tool_calls {
                let result = tokio::select! {
                    result = self.tools.execute(call) => result,
                    () = cancel.cancelled() => return Err(McpError::Cancelled),
                };

                let message = Self::tool_message(call, result);
                let _ = events.send(AgentEvent::Message(message.clone())).await;
                conversation.push(message);
            }
        }

        warn!(
            cap = self.config.max_agentic_iterations,
            "Agentic iteration cap reached"
        );
        let truncated = Message::assistant(
            fresh_id(),
            format!(
                "Stopped after {} agentic iterations without a final answer; \
                 the conversation is truncated.",
                self.config.max_agentic_iterations
            ),
        );
        let _ = events.send(AgentEvent::Message(truncated.clone())).await;
        conversation.push(truncated);
        Ok(conversation)
    }

    /// Tools offered this run, honoring the mcp/a2a switches.
    async fn offered_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .available_tools()
            .await
            .into_iter()
            .filter(|tool| match tool.kind {
                ToolKind::Function => true,
                ToolKind::McpTool => self.config.mcp_enabled,
                ToolKind::A2aAgent => self.config.a2a_enabled,
            })
            .collect()
    }

    async fn invoke_llm(
        &self,
        request: LlmRequest,
        events: &mpsc::Sender<AgentEvent>,
    ) -> McpResult<LlmResponse> {
        if !self.config.streaming_enabled {
            return self.llm.complete(request).await;
        }

        let mut stream = self.llm.stream(request);
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.delta.is_empty() {
                content.push_str(&chunk.delta);
                let _ = events
                    .send(AgentEvent::Chunk {
                        delta: chunk.delta,
                    })
                    .await;
            }
            if let Some(calls) = chunk.tool_calls {
                tool_calls = calls;
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
        })
    }

    /// Build the assistant message, synthesizing ids for calls without one.
    fn assistant_message(response: LlmResponse) -> Message {
        let mut assistant = Message::assistant(fresh_id(), response.content);
        assistant.tool_calls = response
            .tool_calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_none() {
                    call.id = Some(format!("call_{}", Uuid::new_v4().simple()));
                }
                call
            })
            .collect();
        assistant
    }

    /// Build the tool-role message for one executed call.
    ///
    /// Failure results are surfaced just like successes so the model can
    /// react; images ride on the message, files are summarized under an
    /// `Attachments:` header.
    fn tool_message(call: &ToolCall, result: ToolResult) -> Message {
        let attachments = ToolAttachments::from_result(&result);

        let mut content = if result.success {
            result.content
        } else {
            result
                .error
                .unwrap_or_else(|| "Tool execution failed".to_string())
        };

        if !attachments.files.is_empty() {
            content.push_str("\n\nAttachments:");
            for file in &attachments.files {
                content.push_str(&format!("\n- {} ({})", file.name, file.url));
            }
        }

        let call_id = call.id.clone().unwrap_or_default();
        let mut message = Message::tool(fresh_id(), content, call_id);
        message.images = attachments.images;
        message.files = attachments.files;
        message
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionToolProvider;
    use async_trait::async_trait;
    use mcplink_protocol::ToolParameter;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            parameters: vec![ToolParameter {
                name: "input".to_string(),
                description: "input".to_string(),
                type_name: "string".to_string(),
                required: false,
            }],
            kind: ToolKind::Function,
        }
    }

    /// Model that requests `get_time` (without an id) on the first turn
    /// and answers on the second.
    struct TwoTurnModel {
        turns: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for TwoTurnModel {
        async fn complete(&self, request: LlmRequest) -> McpResult<LlmResponse> {
            let turn = self.turns.fetch_add(1, Ordering::SeqCst);
            if turn == 0 {
                assert!(request.tools.iter().any(|t| t.name == "get_time"));
                Ok(LlmResponse {
                    content: "Let me check the clock.".to_string(),
                    tool_calls: vec![ToolCall {
                        name: "get_time".to_string(),
                        arguments: serde_json::json!({}),
                        id: None,
                    }],
                })
            } else {
                // The previous tool result must be in the conversation.
                let last = request.messages.last().unwrap();
                assert_eq!(last.role, mcplink_protocol::Role::Tool);
                assert_eq!(last.content, "12:00Z");
                Ok(LlmResponse {
                    content: "It is noon UTC.".to_string(),
                    tool_calls: vec![],
                })
            }
        }
    }

    fn time_provider() -> FunctionToolProvider {
        FunctionToolProvider::new()
            .function(definition("get_time"), |_| async { Ok("12:00Z".to_string()) })
    }

    async fn collect_events(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_two_turn_loop_with_synthesized_id() {
        let orchestrator = Orchestrator::new(
            Arc::new(TwoTurnModel {
                turns: AtomicUsize::new(0),
            }),
            ToolManager::new().provider(Arc::new(time_provider())),
        );

        let (tx, rx) = mpsc::channel(64);
        let conversation = vec![Message::user(fresh_id(), "What time is it?")];
        let run = orchestrator.run(conversation, tx, CancellationToken::new());
        let (final_conversation, events) = tokio::join!(run, collect_events(rx));
        let final_conversation = final_conversation.unwrap();

        // user + assistant(tool call) + tool + assistant(final)
        assert_eq!(final_conversation.len(), 4);

        let first_assistant = &final_conversation[1];
        let call_id = first_assistant.tool_calls[0].id.clone().unwrap();
        assert!(call_id.starts_with("call_"));

        let tool_message = &final_conversation[2];
        assert_eq!(tool_message.tool_call_id.as_deref(), Some(call_id.as_str()));
        assert_eq!(tool_message.content, "12:00Z");

        assert_eq!(final_conversation[3].content, "It is noon UTC.");

        // Event stream: two assistant messages plus one tool message.
        let messages: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Message(m) => Some(m.clone()),
                AgentEvent::Chunk { .. } => None,
            })
            .collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, mcplink_protocol::Role::Assistant);
        assert_eq!(messages[1].role, mcplink_protocol::Role::Tool);
        assert_eq!(messages[2].role, mcplink_protocol::Role::Assistant);
    }

    /// Model that never stops calling tools.
    struct LoopingModel;

    #[async_trait]
    impl LanguageModel for LoopingModel {
        async fn complete(&self, _request: LlmRequest) -> McpResult<LlmResponse> {
            Ok(LlmResponse {
                content: "again".to_string(),
                tool_calls: vec![ToolCall {
                    name: "get_time".to_string(),
                    arguments: serde_json::json!({}),
                    id: None,
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_iteration_cap_emits_truncation_warning() {
        let config = OrchestratorConfig {
            max_agentic_iterations: 3,
            ..Default::default()
        };
        let orchestrator = Orchestrator::with_config(
            Arc::new(LoopingModel),
            ToolManager::new().provider(Arc::new(time_provider())),
            config,
        );

        let (tx, rx) = mpsc::channel(64);
        let run = orchestrator.run(
            vec![Message::user(fresh_id(), "loop forever")],
            tx,
            CancellationToken::new(),
        );
        let (final_conversation, _events) = tokio::join!(run, collect_events(rx));
        let final_conversation = final_conversation.unwrap();

        // user + 3 * (assistant + tool) + truncation warning
        assert_eq!(final_conversation.len(), 1 + 3 * 2 + 1);
        let last = final_conversation.last().unwrap();
        assert_eq!(last.role, mcplink_protocol::Role::Assistant);
        assert!(last.content.contains("3 agentic iterations"));
    }

    /// Model calling a tool that does not exist, then reading the failure.
    struct MissingToolModel {
        turns: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for MissingToolModel {
        async fn complete(&self, request: LlmRequest) -> McpResult<LlmResponse> {
            if self.turns.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(LlmResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        name: "frobnicate".to_string(),
                        arguments: serde_json::json!({}),
                        id: Some("call_x".to_string()),
                    }],
                })
            } else {
                let last = request.messages.last().unwrap();
                assert!(last.content.contains("Tool not found: frobnicate"));
                Ok(LlmResponse {
                    content: "I cannot do that.".to_string(),
                    tool_calls: vec![],
                })
            }
        }
    }

    #[tokio::test]
    async fn test_failed_tool_result_fed_back_to_model() {
        let orchestrator = Orchestrator::new(
            Arc::new(MissingToolModel {
                turns: AtomicUsize::new(0),
            }),
            ToolManager::new(),
        );

        let (tx, rx) = mpsc::channel(64);
        let run = orchestrator.run(
            vec![Message::user(fresh_id(), "do it")],
            tx,
            CancellationToken::new(),
        );
        let (final_conversation, _) = tokio::join!(run, collect_events(rx));
        let final_conversation = final_conversation.unwrap();

        let tool_message = &final_conversation[2];
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_x"));
        assert!(tool_message.content.contains("Tool not found"));
        assert_eq!(final_conversation[3].content, "I cannot do that.");
    }

    /// Model whose stream yields three chunks.
    struct StreamingModel;

    #[async_trait]
    impl LanguageModel for StreamingModel {
        async fn complete(&self, _request: LlmRequest) -> McpResult<LlmResponse> {
            unreachable!("streaming mode must use stream()")
        }

        fn stream(&self, _request: LlmRequest) -> crate::llm::LlmStream<'_> {
            Box::pin(futures::stream::iter(vec![
                Ok(crate::llm::LlmStreamChunk {
                    delta: "It is ".to_string(),
                    tool_calls: None,
                }),
                Ok(crate::llm::LlmStreamChunk {
                    delta: "noon.".to_string(),
                    tool_calls: None,
                }),
                Ok(crate::llm::LlmStreamChunk {
                    delta: String::new(),
                    tool_calls: Some(vec![]),
                }),
            ]))
        }
    }

    #[tokio::test]
    async fn test_streaming_forwards_chunks_then_consolidates() {
        let config = OrchestratorConfig {
            streaming_enabled: true,
            ..Default::default()
        };
        let orchestrator =
            Orchestrator::with_config(Arc::new(StreamingModel), ToolManager::new(), config);

        let (tx, rx) = mpsc::channel(64);
        let run = orchestrator.run(
            vec![Message::user(fresh_id(), "time?")],
            tx,
            CancellationToken::new(),
        );
        let (final_conversation, events) = tokio::join!(run, collect_events(rx));
        let final_conversation = final_conversation.unwrap();

        let chunks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Chunk { delta } => Some(delta.clone()),
                AgentEvent::Message(_) => None,
            })
            .collect();
        assert_eq!(chunks, vec!["It is ", "noon."]);

        assert_eq!(final_conversation.last().unwrap().content, "It is noon.");
    }

    /// Model that fails outright.
    struct BrokenModel;

    #[async_trait]
    impl LanguageModel for BrokenModel {
        async fn complete(&self, _request: LlmRequest) -> McpResult<LlmResponse> {
            Err(McpError::Transport("provider down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_llm_failure_emits_message_and_halts() {
        let orchestrator = Orchestrator::new(Arc::new(BrokenModel), ToolManager::new());

        let (tx, rx) = mpsc::channel(64);
        let run = orchestrator.run(
            vec![Message::user(fresh_id(), "hi")],
            tx,
            CancellationToken::new(),
        );
        let (result, events) = tokio::join!(run, collect_events(rx));

        assert!(matches!(result, Err(McpError::Llm(_))));
        let AgentEvent::Message(message) = &events[0] else {
            panic!("expected a message event");
        };
        assert!(message.content.contains("model invocation failed"));
    }

    /// Slow model used to exercise cancellation.
    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _request: LlmRequest) -> McpResult<LlmResponse> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(LlmResponse::default())
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_model_call() {
        let orchestrator = Orchestrator::new(Arc::new(SlowModel), ToolManager::new());

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let (tx, _rx) = mpsc::channel(64);
        let result = orchestrator
            .run(vec![Message::user(fresh_id(), "hi")], tx, cancel)
            .await;
        assert!(matches!(result, Err(McpError::Cancelled)));
    }

    #[tokio::test]
    async fn test_attachments_lifted_onto_tool_message() {
        struct AttachingProvider;

        #[async_trait]
        impl crate::tools::ToolProvider for AttachingProvider {
            async fn available_tools(&self) -> Vec<ToolDefinition> {
                vec![definition("screenshot")]
            }
            async fn execute(&self, call: &ToolCall) -> McpResult<ToolResult> {
                let mut result = ToolResult::success("captured", call.id.clone());
                result.metadata = ToolAttachments {
                    images: vec![mcplink_protocol::ImageContent {
                        data: "aGk=".to_string(),
                        mime_type: "image/png".to_string(),
                    }],
                    files: vec![mcplink_protocol::FileReference {
                        url: "https://files.example.com/shot.png".to_string(),
                        name: "shot.png".to_string(),
                    }],
                }
                .into_metadata();
                Ok(result)
            }
        }

        struct OneCallModel {
            turns: AtomicUsize,
        }

        #[async_trait]
        impl LanguageModel for OneCallModel {
            async fn complete(&self, _request: LlmRequest) -> McpResult<LlmResponse> {
                if self.turns.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(LlmResponse {
                        content: String::new(),
                        tool_calls: vec![ToolCall {
                            name: "screenshot".to_string(),
                            arguments: serde_json::json!({}),
                            id: None,
                        }],
                    })
                } else {
                    Ok(LlmResponse {
                        content: "done".to_string(),
                        tool_calls: vec![],
                    })
                }
            }
        }

        let orchestrator = Orchestrator::new(
            Arc::new(OneCallModel {
                turns: AtomicUsize::new(0),
            }),
            ToolManager::new().provider(Arc::new(AttachingProvider)),
        );

        let (tx, rx) = mpsc::channel(64);
        let run = orchestrator.run(
            vec![Message::user(fresh_id(), "grab the screen")],
            tx,
            CancellationToken::new(),
        );
        let (final_conversation, _) = tokio::join!(run, collect_events(rx));
        let final_conversation = final_conversation.unwrap();

        let tool_message = &final_conversation[2];
        assert_eq!(tool_message.images.len(), 1);
        assert_eq!(tool_message.files.len(), 1);
        assert!(tool_message.content.contains("Attachments:"));
        assert!(tool_message.content.contains("shot.png"));
    }
}
