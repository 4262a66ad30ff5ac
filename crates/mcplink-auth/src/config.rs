//! Auth configuration shapes and the environment-variable fallback.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::providers::{
    ApiKeyAuthProvider, AuthProvider, AuthorizationHandler, BasicAuthProvider,
    BearerAuthProvider, OAuthConfig, OAuthDiscoveryProvider, OAuthProvider,
};

/// In-memory auth configuration for a remote server entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "authType", content = "authConfig", rename_all = "camelCase")]
pub enum AuthConfig {
    /// Static bearer token
    Bearer {
        /// The token
        token: String,
    },
    /// API key on a header
    #[serde(rename_all = "camelCase")]
    ApiKey {
        /// The key
        key: String,
        /// Header name, defaults to `X-API-Key`
        #[serde(default)]
        header_name: Option<String>,
        /// Optional value prefix
        #[serde(default)]
        prefix: Option<String>,
    },
    /// RFC 7617 Basic credentials
    Basic {
        /// User id
        username: String,
        /// Password
        password: String,
    },
    /// PKCE OAuth with known endpoints
    #[serde(rename_all = "camelCase")]
    OAuth {
        /// OAuth client id
        client_id: String,
        /// Authorization endpoint
        authorization_endpoint: String,
        /// Token endpoint
        token_endpoint: String,
        /// Redirect URI
        redirect_uri: String,
        /// Requested scope
        #[serde(default)]
        scope: Option<String>,
        /// Resource URI; defaults to the server URL
        #[serde(default)]
        resource: Option<String>,
    },
    /// PKCE OAuth with endpoints resolved via discovery
    #[serde(rename_all = "camelCase")]
    OAuthDiscovery {
        /// Redirect URI
        redirect_uri: String,
        /// Requested scope
        #[serde(default)]
        scope: Option<String>,
        /// Pre-registered client id, skipping dynamic registration
        #[serde(default)]
        client_id: Option<String>,
    },
}

/// Build a provider from an explicit configuration.
///
/// `server_url` is the remote server's base URL, used as the default
/// RFC 8707 resource. OAuth variants need `handler` for the browser step.
pub fn provider_from_config(
    config: &AuthConfig,
    server_url: &str,
    handler: Option<Arc<dyn AuthorizationHandler>>,
) -> AuthResult<Arc<dyn AuthProvider>> {
    match config {
        AuthConfig::Bearer { token } => Ok(Arc::new(BearerAuthProvider::new(token.clone()))),
        AuthConfig::ApiKey {
            key,
            header_name,
            prefix,
        } => Ok(Arc::new(ApiKeyAuthProvider::with_header(
            key.clone(),
            header_name.clone().unwrap_or_else(|| "X-API-Key".to_string()),
            prefix.clone(),
        ))),
        AuthConfig::Basic { username, password } => Ok(Arc::new(BasicAuthProvider::new(
            username.clone(),
            password.clone(),
        )?)),
        AuthConfig::OAuth {
            client_id,
            authorization_endpoint,
            token_endpoint,
            redirect_uri,
            scope,
            resource,
        } => {
            let mut provider = OAuthProvider::new(OAuthConfig {
                client_id: client_id.clone(),
                authorization_endpoint: authorization_endpoint.clone(),
                token_endpoint: token_endpoint.clone(),
                redirect_uri: redirect_uri.clone(),
                scope: scope.clone(),
                resource: resource.clone().unwrap_or_else(|| server_url.to_string()),
            })?;
            if let Some(handler) = handler {
                provider = provider.with_authorization_handler(handler);
            }
            Ok(Arc::new(provider))
        }
        AuthConfig::OAuthDiscovery {
            redirect_uri,
            scope,
            client_id,
        } => {
            let handler = handler.ok_or_else(|| {
                AuthError::AuthenticationFailed(
                    "OAuth discovery requires an authorization handler".to_string(),
                )
            })?;
            Ok(Arc::new(OAuthDiscoveryProvider::new(
                server_url,
                redirect_uri.clone(),
                scope.clone(),
                client_id.clone(),
                handler,
            )?))
        }
    }
}

/// Probe the environment for credentials for server `name`.
///
/// For the variable prefix, the name is uppercased and every
/// non-alphanumeric character becomes `_`. Probe order (first match wins):
/// `<N>_TOKEN` (Bearer), `<N>_API_KEY` (API key on `X-API-Key`), then
/// `<N>_USERNAME` + `<N>_PASSWORD` (Basic).
pub fn provider_from_env(name: &str) -> Option<Arc<dyn AuthProvider>> {
    let prefix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();

    if let Ok(token) = std::env::var(format!("{prefix}_TOKEN")) {
        debug!(server = name, "Using bearer token from environment");
        return Some(Arc::new(BearerAuthProvider::new(token)));
    }

    if let Ok(key) = std::env::var(format!("{prefix}_API_KEY")) {
        debug!(server = name, "Using API key from environment");
        return Some(Arc::new(ApiKeyAuthProvider::new(key)));
    }

    if let (Ok(username), Ok(password)) = (
        std::env::var(format!("{prefix}_USERNAME")),
        std::env::var(format!("{prefix}_PASSWORD")),
    ) {
        debug!(server = name, "Using basic credentials from environment");
        return BasicAuthProvider::new(username, password)
            .ok()
            .map(|p| Arc::new(p) as Arc<dyn AuthProvider>);
    }

    None
}
