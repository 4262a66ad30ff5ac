//! Discovery document fetcher and dynamic client registration.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::resource::canonical_resource_uri;

use super::types::{
    AuthorizationServerMetadata, ClientRegistrationRequest, ClientRegistrationResponse,
    ProtectedResourceMetadata,
};

/// Well-known path for RFC 9728 protected resource metadata.
const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
/// Well-known path for OIDC discovery.
const OIDC_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";
/// Well-known path for RFC 8414 authorization server metadata.
const OAUTH_AS_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// Fetches discovery documents and performs dynamic client registration.
///
/// The chain, given a resource server base URL and an optional
/// resource-metadata URL from a 401 challenge:
///
/// 1. protected-resource metadata (challenge URL, or well-known probes);
/// 2. authorization-server metadata for each listed server, preferring the
///    OIDC document and falling back to RFC 8414;
/// 3. optional dynamic client registration when the server offers it and
///    the caller has no pre-registered `client_id`.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
}

impl DiscoveryClient {
    /// Create a discovery client with a dedicated HTTP client.
    ///
    /// Redirects are not followed: discovery endpoints that redirect are
    /// suspect, and not following keeps the fetcher SSRF-conservative.
    pub fn new() -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Build a discovery client around an existing `reqwest::Client`.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Fetch protected-resource metadata.
    ///
    /// When `metadata_url` (from a `WWW-Authenticate` challenge) is given it
    /// is fetched directly. Otherwise the well-known locations under the
    /// canonicalized `resource_base` are probed in order:
    /// `…/oauth-protected-resource/<resource_type>` (when a type is given),
    /// then `…/oauth-protected-resource`.
    pub async fn protected_resource_metadata(
        &self,
        resource_base: &str,
        metadata_url: Option<&str>,
        resource_type: Option<&str>,
    ) -> AuthResult<ProtectedResourceMetadata> {
        let candidates: Vec<String> = match metadata_url {
            Some(url) => vec![url.to_string()],
            None => {
                let canonical = canonical_resource_uri(resource_base)?;
                let base = canonical.trim_end_matches('/');
                let mut urls = Vec::new();
                if let Some(rt) = resource_type {
                    urls.push(format!("{base}{PROTECTED_RESOURCE_PATH}/{rt}"));
                }
                urls.push(format!("{base}{PROTECTED_RESOURCE_PATH}"));
                urls
            }
        };

        let mut last_error = String::new();
        for url in &candidates {
            debug!(url = %url, "Fetching protected resource metadata");
            match self.fetch_json::<ProtectedResourceMetadata>(url).await {
                Ok(metadata) => {
                    metadata
                        .validate()
                        .map_err(AuthError::OAuthDiscoveryFailed)?;
                    return Ok(metadata);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Protected resource metadata probe failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(AuthError::OAuthDiscoveryFailed(format!(
            "No protected resource metadata at {candidates:?}: {last_error}"
        )))
    }

    /// Fetch authorization-server metadata for one issuer.
    ///
    /// Probes the OIDC discovery document first, then the RFC 8414
    /// location. Rejects servers that do not advertise S256 PKCE.
    pub async fn authorization_server_metadata(
        &self,
        issuer: &str,
    ) -> AuthResult<AuthorizationServerMetadata> {
        let base = issuer.trim_end_matches('/');
        let candidates = [
            format!("{base}{OIDC_CONFIGURATION_PATH}"),
            format!("{base}{OAUTH_AS_METADATA_PATH}"),
        ];

        let mut last_error = String::new();
        for url in &candidates {
            debug!(url = %url, "Fetching authorization server metadata");
            match self.fetch_json::<AuthorizationServerMetadata>(url).await {
                Ok(metadata) => {
                    if !metadata.supports_s256() {
                        return Err(AuthError::PkceNotSupported);
                    }
                    return Ok(metadata);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Authorization server metadata probe failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(AuthError::OAuthDiscoveryFailed(format!(
            "No authorization server metadata for {issuer}: {last_error}"
        )))
    }

    /// Walk the authorization servers in order, returning the first whose
    /// metadata resolves.
    pub async fn first_usable_authorization_server(
        &self,
        resource_metadata: &ProtectedResourceMetadata,
    ) -> AuthResult<AuthorizationServerMetadata> {
        let mut last_error =
            AuthError::OAuthDiscoveryFailed("No authorization servers listed".to_string());

        for issuer in &resource_metadata.authorization_servers {
            match self.authorization_server_metadata(issuer).await {
                Ok(metadata) => return Ok(metadata),
                // A server without S256 is a hard protocol mismatch;
                // trying the next one is still correct.
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    /// Register a client (RFC 7591) and return the issued `client_id`.
    pub async fn register_client(
        &self,
        registration_endpoint: &str,
        request: &ClientRegistrationRequest,
    ) -> AuthResult<ClientRegistrationResponse> {
        debug!(endpoint = %registration_endpoint, "Registering OAuth client");

        let response = self
            .http
            .post(registration_endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::OAuthDiscoveryFailed(format!("Registration failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::OAuthDiscoveryFailed(format!(
                "Registration endpoint answered {status}: {body}"
            )));
        }

        response.json::<ClientRegistrationResponse>().await.map_err(|e| {
            AuthError::OAuthDiscoveryFailed(format!("Invalid registration response: {e}"))
        })
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> AuthResult<T> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::InvalidMetadata(format!(
                "{url} answered {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AuthError::InvalidMetadata(format!("{url}: {e}")))
    }
}
