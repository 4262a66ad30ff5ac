//! Remote server configuration entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcplink_auth::{
    AuthConfig, AuthProvider, AuthorizationHandler, provider_from_config, provider_from_env,
};
use mcplink_transport_traits::{TransportError, TransportResult};
use tracing::debug;

use crate::transport::{HttpTransport, HttpTransportConfig};

/// In-memory configuration for one remote MCP server.
#[derive(Debug, Clone)]
pub struct RemoteServerConfig {
    /// Server name, used for logging and env-var auth fallback
    pub name: String,
    /// MCP endpoint URL
    pub url: String,
    /// Explicit auth configuration; when absent the environment is probed
    pub auth: Option<AuthConfig>,
    /// Handshake bound (default 30 s)
    pub connection_timeout: Option<Duration>,
    /// Per-request bound (default 60 s)
    pub request_timeout: Option<Duration>,
    /// Retry cap (default 3)
    pub max_retries: Option<u32>,
    /// Pre-registered OAuth client id for discovery auth
    pub client_id: Option<String>,
}

impl RemoteServerConfig {
    /// Entry for `name` at `url`, everything else defaulted.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            auth: None,
            connection_timeout: None,
            request_timeout: None,
            max_retries: None,
            client_id: None,
        }
    }

    /// Resolve the auth provider for this entry.
    ///
    /// Explicit configuration wins; otherwise the environment is probed
    /// (`<NAME>_TOKEN`, `<NAME>_API_KEY`, `<NAME>_USERNAME`/`_PASSWORD`).
    /// `None` means the server is unauthenticated.
    pub fn resolve_provider(
        &self,
        handler: Option<Arc<dyn AuthorizationHandler>>,
    ) -> TransportResult<Option<Arc<dyn AuthProvider>>> {
        if let Some(config) = &self.auth {
            // Thread the pre-registered client id into discovery auth.
            let config = match (config, &self.client_id) {
                (
                    AuthConfig::OAuthDiscovery {
                        redirect_uri,
                        scope,
                        client_id: None,
                    },
                    Some(client_id),
                ) => AuthConfig::OAuthDiscovery {
                    redirect_uri: redirect_uri.clone(),
                    scope: scope.clone(),
                    client_id: Some(client_id.clone()),
                },
                _ => config.clone(),
            };

            let provider = provider_from_config(&config, &self.url, handler)
                .map_err(TransportError::from)?;
            return Ok(Some(provider));
        }

        if let Some(provider) = provider_from_env(&self.name) {
            debug!(server = %self.name, scheme = provider.scheme(), "Auth resolved from environment");
            return Ok(Some(provider));
        }

        Ok(None)
    }

    /// Build the transport for this entry.
    pub fn build_transport(
        &self,
        handler: Option<Arc<dyn AuthorizationHandler>>,
    ) -> TransportResult<HttpTransport> {
        let mut config = HttpTransportConfig::new(self.url.clone());
        if let Some(timeout) = self.connection_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        config.headers = HashMap::new();

        let transport = HttpTransport::new(config)?;
        match self.resolve_provider(handler)? {
            Some(provider) => Ok(transport.with_auth_provider(provider)),
            None => Ok(transport),
        }
    }
}
