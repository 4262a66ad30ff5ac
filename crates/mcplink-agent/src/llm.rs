//! The language-model capability interface.
//!
//! Concrete provider adapters (OpenAI, Anthropic, local runtimes) live
//! outside this workspace; the orchestrator sees only this trait.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use mcplink_protocol::{McpResult, Message, ToolCall, ToolDefinition};

/// One model invocation.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Conversation so far, oldest first
    pub messages: Vec<Message>,
    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,
    /// Token cap
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Nucleus sampling parameter
    pub top_p: Option<f64>,
    /// Provider-specific extras
    pub additional_parameters: HashMap<String, Value>,
}

/// A complete model response.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Textual output
    pub content: String,
    /// Tool calls the model requests, in order
    pub tool_calls: Vec<ToolCall>,
}

/// One chunk of a streamed response.
///
/// Text arrives as deltas; tool calls arrive once, on the chunk that
/// completes the response.
#[derive(Debug, Clone, Default)]
pub struct LlmStreamChunk {
    /// Text delta
    pub delta: String,
    /// Tool calls, present on the final chunk only
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Boxed chunk stream.
pub type LlmStream<'a> = Pin<Box<dyn Stream<Item = McpResult<LlmStreamChunk>> + Send + 'a>>;

/// A model that can complete a conversation, optionally streaming.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: LlmRequest) -> McpResult<LlmResponse>;

    /// Stream one completion.
    ///
    /// The default wraps [`complete`](Self::complete) in a single-chunk
    /// stream, so non-streaming models work everywhere.
    fn stream(&self, request: LlmRequest) -> LlmStream<'_> {
        Box::pin(futures::stream::once(async move {
            self.complete(request).await.map(|response| LlmStreamChunk {
                delta: response.content,
                tool_calls: Some(response.tool_calls),
            })
        }))
    }
}
