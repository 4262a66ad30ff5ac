//! Orchestrator configuration.

use std::collections::HashMap;

use serde_json::Value;

/// Configuration for [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Forward partial LLM chunks to the event stream
    pub streaming_enabled: bool,
    /// Offer MCP-provided tools to the model
    pub mcp_enabled: bool,
    /// Offer A2A agents to the model
    pub a2a_enabled: bool,
    /// Token cap passed to the model
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Nucleus sampling parameter
    pub top_p: Option<f64>,
    /// Provider-specific extras passed through verbatim
    pub additional_parameters: HashMap<String, Value>,
    /// Cap on model/tool iterations per run (default 10)
    pub max_agentic_iterations: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            streaming_enabled: false,
            mcp_enabled: true,
            a2a_enabled: true,
            max_tokens: None,
            temperature: None,
            top_p: None,
            additional_parameters: HashMap::new(),
            max_agentic_iterations: 10,
        }
    }
}
