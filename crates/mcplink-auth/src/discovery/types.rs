//! Discovery document shapes.
//!
//! Field names are snake_case on the wire per RFC 8414 / RFC 9728 /
//! RFC 7591; serde derives map them directly.

use serde::{Deserialize, Serialize};

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The resource identifier
    pub resource: String,
    /// Authorization servers able to issue tokens for this resource
    pub authorization_servers: Vec<String>,
    /// Scopes the resource understands
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

impl ProtectedResourceMetadata {
    /// Structural validation beyond deserialization.
    pub fn validate(&self) -> Result<(), String> {
        if self.resource.is_empty() {
            return Err("metadata is missing `resource`".to_string());
        }
        if self.authorization_servers.is_empty() {
            return Err("metadata lists no authorization servers".to_string());
        }
        Ok(())
    }
}

/// RFC 8414 authorization server metadata (also the OIDC discovery shape).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint URL
    pub authorization_endpoint: String,
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Dynamic registration endpoint, when offered
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    /// Supported grant types
    #[serde(default)]
    pub grant_types_supported: Option<Vec<String>>,
    /// Supported PKCE challenge methods
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

impl AuthorizationServerMetadata {
    /// Whether the server advertises S256 PKCE support.
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_deref()
            .is_some_and(|methods| methods.iter().any(|m| m == "S256"))
    }
}

/// RFC 7591 registration request, MCP-optimized: a native public client
/// doing the authorization-code + refresh grant with PKCE.
#[derive(Debug, Clone, Serialize)]
pub struct ClientRegistrationRequest {
    /// `native` for MCP clients
    pub application_type: String,
    /// Grant types the client will use
    pub grant_types: Vec<String>,
    /// Response types the client will use
    pub response_types: Vec<String>,
    /// `none`: public client, PKCE instead of a secret
    pub token_endpoint_auth_method: String,
    /// Redirect URIs the client will present
    pub redirect_uris: Vec<String>,
    /// Requested scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Human-readable client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

impl ClientRegistrationRequest {
    /// The standard MCP client registration payload.
    pub fn mcp_client(redirect_uris: Vec<String>, scope: Option<String>) -> Self {
        Self {
            application_type: "native".to_string(),
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
            redirect_uris,
            scope,
            client_name: Some("mcplink".to_string()),
        }
    }
}

/// RFC 7591 registration response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Issued client identifier
    pub client_id: String,
    /// Issuance time, seconds since the epoch
    #[serde(default)]
    pub client_id_issued_at: Option<i64>,
    /// Client secret (absent for public clients)
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Secret expiry, seconds since the epoch, 0 = never
    #[serde(default)]
    pub client_secret_expires_at: Option<i64>,
    /// Redirect URIs the server accepted
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
}
