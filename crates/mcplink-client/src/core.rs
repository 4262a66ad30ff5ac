//! The MCP client: handshake, state machine, and typed operations.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mcplink_protocol::{
    CallToolResult, ClientCapabilities, InitializeRequest, InitializeResult, JsonRpcNotification,
    ListPromptsResult, ListResourcesResult, ListToolsResult, McpError, McpResult,
    PROTOCOL_VERSION, ReadResourceResult, ServerCapabilities,
};
use mcplink_transport_traits::Transport;

use crate::config::ClientConfig;
use crate::protocol::ProtocolClient;

/// Client lifecycle. Only `Initialized` permits operations;
/// `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, no connection yet
    NotConnected,
    /// Handshake in progress
    Connecting,
    /// Handshake complete; operations permitted
    Initialized,
    /// Terminal
    Disconnected,
}

/// An MCP client over one transport.
///
/// The client owns a shared reference to its transport for its lifetime;
/// the transport cannot be taken back out.
#[derive(Debug)]
pub struct Client<T: Transport> {
    protocol: ProtocolClient<T>,
    config: ClientConfig,
    state: ClientState,
    server_capabilities: Option<ServerCapabilities>,
}

impl<T: Transport + 'static> Client<T> {
    /// Create a client with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            protocol: ProtocolClient::new(transport),
            config,
            state: ClientState::NotConnected,
            server_capabilities: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Capabilities the server reported during `initialize`.
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    /// Take the server-notification stream (single consumer).
    pub async fn notifications(&self) -> Option<mpsc::Receiver<JsonRpcNotification>> {
        self.protocol.take_notifications().await
    }

    /// Connect the transport and perform the `initialize` handshake.
    ///
    /// Validates the server's protocol version; on mismatch the client
    /// disconnects and fails with [`McpError::ProtocolMismatch`].
    pub async fn initialize(&mut self) -> McpResult<InitializeResult> {
        match self.state {
            ClientState::NotConnected => {}
            ClientState::Initialized => {
                return Err(McpError::Internal("Client already initialized".to_string()));
            }
            ClientState::Connecting => {
                return Err(McpError::Internal("Initialize already in progress".to_string()));
            }
            ClientState::Disconnected => return Err(McpError::NotConnected),
        }

        self.state = ClientState::Connecting;

        let result = self.do_initialize().await;
        match result {
            Ok(init) => {
                self.state = ClientState::Initialized;
                Ok(init)
            }
            Err(e) => {
                warn!(error = %e, "Initialize failed; disconnecting");
                let _ = self.protocol.disconnect().await;
                self.state = ClientState::Disconnected;
                Err(e)
            }
        }
    }

    async fn do_initialize(&mut self) -> McpResult<InitializeResult> {
        self.protocol.connect().await?;

        let request = InitializeRequest {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: self.config.client_info.clone(),
        };

        let init: InitializeResult = self
            .protocol
            .request(
                "initialize",
                Some(serde_json::to_value(request)?),
                self.config.connect_timeout,
            )
            .await?;

        if init.protocol_version != PROTOCOL_VERSION {
            return Err(McpError::ProtocolMismatch {
                client: PROTOCOL_VERSION.to_string(),
                server: init.protocol_version,
            });
        }

        self.server_capabilities = Some(init.capabilities.clone());
        self.protocol.notify("notifications/initialized", None).await?;

        debug!(server = %init.server_info.name, "MCP handshake complete");
        Ok(init)
    }

    fn require_initialized(&self) -> McpResult<()> {
        match self.state {
            ClientState::Initialized => Ok(()),
            _ => Err(McpError::NotConnected),
        }
    }

    /// `tools/list`
    pub async fn list_tools(&self) -> McpResult<ListToolsResult> {
        self.require_initialized()?;
        self.protocol
            .request("tools/list", None, self.config.request_timeout)
            .await
    }

    /// `tools/call`
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> McpResult<CallToolResult> {
        self.require_initialized()?;

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments.unwrap_or_default(),
        });
        self.protocol
            .request("tools/call", Some(params), self.config.request_timeout)
            .await
    }

    /// `tools/call`, aborting at the token.
    ///
    /// On cancellation a `notifications/cancelled` carrying the request id
    /// is sent best-effort and the waiter is dropped.
    pub async fn call_tool_with_cancellation(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
        cancel: &CancellationToken,
    ) -> McpResult<CallToolResult> {
        self.require_initialized()?;

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments.unwrap_or_default(),
        });
        let (id, rx) = self.protocol.send_request("tools/call", Some(params)).await?;

        tokio::select! {
            outcome = tokio::time::timeout(self.config.request_timeout, rx) => {
                match outcome {
                    Ok(Ok(response)) => {
                        if let Some(error) = response.error() {
                            return Err(McpError::rpc(error.code, error.message.clone()));
                        }
                        serde_json::from_value(response.result().cloned().unwrap_or_default())
                            .map_err(|e| McpError::InvalidResponse(format!("tools/call: {e}")))
                    }
                    Ok(Err(_)) => Err(McpError::Transport(
                        "Connection closed while awaiting response".to_string(),
                    )),
                    Err(_) => {
                        self.protocol.abandon(&id);
                        Err(McpError::RequestTimeout(format!(
                            "tools/call after {:?}",
                            self.config.request_timeout
                        )))
                    }
                }
            }
            () = cancel.cancelled() => {
                self.protocol.abandon(&id);
                let params = serde_json::json!({ "requestId": id });
                if let Err(e) = self.protocol.notify("notifications/cancelled", Some(params)).await {
                    debug!(error = %e, "Failed to send cancellation notification");
                }
                Err(McpError::Cancelled)
            }
        }
    }

    /// `resources/list`
    pub async fn list_resources(&self) -> McpResult<ListResourcesResult> {
        self.require_initialized()?;
        self.protocol
            .request("resources/list", None, self.config.request_timeout)
            .await
    }

    /// `resources/read`
    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.require_initialized()?;
        let params = serde_json::json!({ "uri": uri });
        self.protocol
            .request("resources/read", Some(params), self.config.request_timeout)
            .await
    }

    /// `resources/subscribe`
    pub async fn subscribe_resource(&self, uri: &str) -> McpResult<serde_json::Value> {
        self.require_initialized()?;
        if uri.is_empty() {
            return Err(McpError::InvalidResponse(
                "Subscription URI cannot be empty".to_string(),
            ));
        }
        let params = serde_json::json!({ "uri": uri });
        self.protocol
            .request("resources/subscribe", Some(params), self.config.request_timeout)
            .await
    }

    /// `prompts/list`
    pub async fn list_prompts(&self) -> McpResult<ListPromptsResult> {
        self.require_initialized()?;
        self.protocol
            .request("prompts/list", None, self.config.request_timeout)
            .await
    }

    /// `ping`
    pub async fn ping(&self) -> McpResult<()> {
        self.require_initialized()?;
        let _: serde_json::Value = self
            .protocol
            .request("ping", None, self.config.request_timeout)
            .await?;
        Ok(())
    }

    /// Disconnect. Terminal: the client cannot be reconnected.
    pub async fn disconnect(&mut self) -> McpResult<()> {
        if self.state == ClientState::Disconnected {
            return Ok(());
        }
        self.state = ClientState::Disconnected;
        self.protocol.disconnect().await
    }
}
