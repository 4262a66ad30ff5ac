//! OAuth 2.1 providers: PKCE authorization-code flow with RFC 8707
//! resource indicators, and the discovery-driven variant that resolves its
//! endpoints lazily from a 401 challenge.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::discovery::{ClientRegistrationRequest, DiscoveryClient};
use crate::error::{AuthError, AuthResult};
use crate::pkce::PkcePair;
use crate::resource::canonical_resource_uri;
use crate::tokens::{OAuthTokens, TokenResponse};

use super::{AuthProvider, resource_metadata_from_challenge};

/// Completes the browser step of the authorization-code flow.
///
/// The provider builds the authorization URL; the handler gets the user
/// through it and returns the `code` and `state` delivered to the redirect
/// URI.
#[async_trait]
pub trait AuthorizationHandler: Send + Sync {
    /// Drive the user through `authorization_url`; return `(code, state)`.
    async fn authorize(&self, authorization_url: &str) -> AuthResult<(String, String)>;
}

/// Static endpoint configuration for [`OAuthProvider`].
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client id (pre-registered or from dynamic registration)
    pub client_id: String,
    /// Authorization endpoint URL
    pub authorization_endpoint: String,
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Redirect URI presented to the authorization server
    pub redirect_uri: String,
    /// Requested scope
    pub scope: Option<String>,
    /// Canonical resource URI (RFC 8707), sent with every token request
    pub resource: String,
}

/// PKCE OAuth provider.
///
/// `headers()` serves the current access token, refreshing it through the
/// token endpoint once `now >= expiry - 30s`. Refresh is single-flight:
/// concurrent callers that observe an expired token queue on one gate and
/// re-check after the winner refreshed.
pub struct OAuthProvider {
    config: OAuthConfig,
    http: reqwest::Client,
    tokens: Arc<RwLock<Option<OAuthTokens>>>,
    refresh_gate: Arc<Mutex<()>>,
    handler: Option<Arc<dyn AuthorizationHandler>>,
}

impl std::fmt::Debug for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProvider")
            .field("client_id", &self.config.client_id)
            .field("resource", &self.config.resource)
            .field("tokens", &"<redacted>")
            .finish()
    }
}

impl OAuthProvider {
    /// Create a provider; the configured resource URI is canonicalized and
    /// rejected up front when malformed.
    pub fn new(mut config: OAuthConfig) -> AuthResult<Self> {
        config.resource = canonical_resource_uri(&config.resource)?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            tokens: Arc::new(RwLock::new(None)),
            refresh_gate: Arc::new(Mutex::new(())),
            handler: None,
        })
    }

    /// Attach the handler that completes browser steps.
    #[must_use]
    pub fn with_authorization_handler(mut self, handler: Arc<dyn AuthorizationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Seed the provider with previously persisted tokens.
    #[must_use]
    pub fn with_tokens(mut self, tokens: OAuthTokens) -> Self {
        self.tokens = Arc::new(RwLock::new(Some(tokens)));
        self
    }

    /// Seed tokens from an async context.
    pub async fn set_tokens(&self, tokens: OAuthTokens) {
        *self.tokens.write().await = Some(tokens);
    }

    /// Current tokens, if any.
    pub async fn tokens(&self) -> Option<OAuthTokens> {
        self.tokens.read().await.clone()
    }

    /// The canonical resource URI this provider binds tokens to.
    pub fn resource(&self) -> &str {
        &self.config.resource
    }

    /// Build the authorization URL for a PKCE pair and state value.
    fn authorization_url(&self, pkce: &PkcePair, state: &str) -> AuthResult<String> {
        let mut url = Url::parse(&self.config.authorization_endpoint).map_err(|e| {
            AuthError::OAuthDiscoveryFailed(format!(
                "Invalid authorization endpoint {}: {e}",
                self.config.authorization_endpoint
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256")
                .append_pair("state", state)
                .append_pair("resource", &self.config.resource);
            if let Some(scope) = &self.config.scope {
                query.append_pair("scope", scope);
            }
        }

        Ok(url.into())
    }

    /// Run the full authorization-code exchange: browser step, state check,
    /// code-for-token exchange. Stores and returns the resulting tokens.
    pub async fn authorize(&self) -> AuthResult<OAuthTokens> {
        let handler = self.handler.as_ref().ok_or_else(|| {
            AuthError::AuthenticationFailed(
                "Authorization required but no authorization handler is configured".to_string(),
            )
        })?;

        let pkce = PkcePair::generate();
        let state = Uuid::new_v4().to_string();
        let url = self.authorization_url(&pkce, &state)?;

        debug!(client_id = %self.config.client_id, "Starting authorization code flow");
        let (code, returned_state) = handler.authorize(&url).await?;

        if returned_state != state {
            return Err(AuthError::StateMismatch);
        }

        let tokens = self.exchange_code(&code, &pkce.verifier).await?;
        *self.tokens.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> AuthResult<OAuthTokens> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
            ("client_id", &self.config.client_id),
            ("code_verifier", verifier),
            ("resource", &self.config.resource),
        ];

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::AuthenticationFailed(format!(
                "Token exchange failed with {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AuthError::AuthenticationFailed(format!("Invalid token response: {e}"))
        })?;

        Ok(OAuthTokens::from_response(token_response, Utc::now(), None))
    }

    /// Refresh the access token, single-flight.
    ///
    /// On refresh failure the stored tokens are cleared so the next caller
    /// restarts the authorization flow instead of looping on a dead grant.
    async fn refresh(&self) -> AuthResult<OAuthTokens> {
        let _gate = self.refresh_gate.lock().await;

        // Another caller may have refreshed while we queued on the gate.
        if let Some(tokens) = self.tokens.read().await.clone() {
            if !tokens.is_expired(Utc::now()) {
                return Ok(tokens);
            }
        }

        let refresh_token = {
            let tokens = self.tokens.read().await;
            tokens.as_ref().and_then(|t| t.refresh_token.clone())
        };
        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::AuthenticationFailed(
                "Access token expired and no refresh token is available".to_string(),
            ));
        };

        debug!(client_id = %self.config.client_id, "Refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", &self.config.client_id),
            ("resource", &self.config.resource),
        ];

        let result: AuthResult<TokenResponse> = async {
            let response = self
                .http
                .post(&self.config.token_endpoint)
                .form(&form)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AuthError::AuthenticationFailed(format!(
                    "Token refresh failed with {status}: {body}"
                )));
            }

            response.json::<TokenResponse>().await.map_err(|e| {
                AuthError::AuthenticationFailed(format!("Invalid refresh response: {e}"))
            })
        }
        .await;

        match result {
            Ok(token_response) => {
                let tokens =
                    OAuthTokens::from_response(token_response, Utc::now(), Some(refresh_token));
                *self.tokens.write().await = Some(tokens.clone());
                Ok(tokens)
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed; clearing tokens");
                *self.tokens.write().await = None;
                Err(e)
            }
        }
    }

    async fn usable_tokens(&self) -> AuthResult<OAuthTokens> {
        let current = self.tokens.read().await.clone();

        match current {
            Some(tokens) if !tokens.is_expired(Utc::now()) => Ok(tokens),
            Some(tokens) if tokens.refresh_token.is_some() => self.refresh().await,
            Some(_) | None if self.handler.is_some() => self.authorize().await,
            Some(_) => Err(AuthError::AuthenticationFailed(
                "Access token expired; reauthorization required".to_string(),
            )),
            None => Err(AuthError::AuthenticationFailed(
                "No OAuth tokens; complete the authorization flow first".to_string(),
            )),
        }
    }
}

#[async_trait]
impl AuthProvider for OAuthProvider {
    fn scheme(&self) -> &'static str {
        "oauth"
    }

    async fn headers(&self) -> AuthResult<HashMap<String, String>> {
        let tokens = self.usable_tokens().await?;
        Ok(HashMap::from([(
            "Authorization".to_string(),
            tokens.authorization_value(),
        )]))
    }

    async fn handle_challenge(&self, _challenge: &str) -> AuthResult<HashMap<String, String>> {
        // The server rejected the current access token: invalidate it and
        // recover through refresh (or a fresh grant) if we can.
        let had_refresh = {
            let mut tokens = self.tokens.write().await;
            match tokens.as_mut() {
                Some(t) => {
                    t.expires_at = Some(Utc::now());
                    t.refresh_token.is_some()
                }
                None => false,
            }
        };

        if !had_refresh && self.handler.is_none() {
            *self.tokens.write().await = None;
            return Err(AuthError::AuthenticationFailed(
                "Token rejected and no refresh token; a new authorization code exchange is required"
                    .to_string(),
            ));
        }

        self.headers().await
    }

    async fn cleanup(&self) {
        *self.tokens.write().await = None;
    }
}

/// Discovery-driven OAuth provider.
///
/// Holds only the resource server URL and client hints; on first
/// `headers()` call it runs the discovery chain (protected-resource
/// metadata, authorization-server metadata, optional dynamic client
/// registration), then delegates to an inner [`OAuthProvider`].
pub struct OAuthDiscoveryProvider {
    server_url: String,
    resource_type: Option<String>,
    resource_metadata_url: Mutex<Option<String>>,
    preregistered_client_id: Option<String>,
    redirect_uri: String,
    scope: Option<String>,
    handler: Arc<dyn AuthorizationHandler>,
    discovery: DiscoveryClient,
    inner: Mutex<Option<Arc<OAuthProvider>>>,
}

impl std::fmt::Debug for OAuthDiscoveryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthDiscoveryProvider")
            .field("server_url", &self.server_url)
            .field("client_id", &self.preregistered_client_id)
            .finish()
    }
}

impl OAuthDiscoveryProvider {
    /// Provider for `server_url`, discovering endpoints on first use.
    pub fn new(
        server_url: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: Option<String>,
        preregistered_client_id: Option<String>,
        handler: Arc<dyn AuthorizationHandler>,
    ) -> AuthResult<Self> {
        Ok(Self {
            server_url: server_url.into(),
            resource_type: None,
            resource_metadata_url: Mutex::new(None),
            preregistered_client_id,
            redirect_uri: redirect_uri.into(),
            scope,
            handler,
            discovery: DiscoveryClient::new()?,
            inner: Mutex::new(None),
        })
    }

    /// Set the resource type probed first under the well-known path.
    #[must_use]
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    /// Seed the metadata URL from an earlier 401 challenge, skipping the
    /// well-known probes.
    pub async fn set_resource_metadata_url(&self, url: impl Into<String>) {
        *self.resource_metadata_url.lock().await = Some(url.into());
    }

    async fn ensure_inner(&self) -> AuthResult<Arc<OAuthProvider>> {
        let mut inner = self.inner.lock().await;
        if let Some(provider) = inner.as_ref() {
            return Ok(Arc::clone(provider));
        }

        let metadata_url = self.resource_metadata_url.lock().await.clone();
        let resource_metadata = self
            .discovery
            .protected_resource_metadata(
                &self.server_url,
                metadata_url.as_deref(),
                self.resource_type.as_deref(),
            )
            .await?;

        let as_metadata = self
            .discovery
            .first_usable_authorization_server(&resource_metadata)
            .await?;

        let client_id = match &self.preregistered_client_id {
            Some(client_id) => client_id.clone(),
            None => {
                let registration_endpoint =
                    as_metadata.registration_endpoint.as_ref().ok_or_else(|| {
                        AuthError::OAuthDiscoveryFailed(
                            "No client_id configured and the authorization server offers no \
                             registration endpoint"
                                .to_string(),
                        )
                    })?;

                let request = ClientRegistrationRequest::mcp_client(
                    vec![self.redirect_uri.clone()],
                    self.scope.clone(),
                );
                self.discovery
                    .register_client(registration_endpoint, &request)
                    .await?
                    .client_id
            }
        };

        let provider = OAuthProvider::new(OAuthConfig {
            client_id,
            authorization_endpoint: as_metadata.authorization_endpoint,
            token_endpoint: as_metadata.token_endpoint,
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            resource: resource_metadata.resource,
        })?
        .with_authorization_handler(Arc::clone(&self.handler));

        let provider = Arc::new(provider);
        *inner = Some(Arc::clone(&provider));
        Ok(provider)
    }
}

#[async_trait]
impl AuthProvider for OAuthDiscoveryProvider {
    fn scheme(&self) -> &'static str {
        "oauth-discovery"
    }

    async fn headers(&self) -> AuthResult<HashMap<String, String>> {
        self.ensure_inner().await?.headers().await
    }

    async fn handle_challenge(&self, challenge: &str) -> AuthResult<HashMap<String, String>> {
        // A challenge naming a metadata URL restarts discovery against it;
        // anything else is delegated to the resolved provider.
        if let Some(url) = resource_metadata_from_challenge(challenge) {
            *self.resource_metadata_url.lock().await = Some(url);
            *self.inner.lock().await = None;
            return self.ensure_inner().await?.headers().await;
        }

        self.ensure_inner().await?.handle_challenge(challenge).await
    }

    async fn cleanup(&self) {
        if let Some(provider) = self.inner.lock().await.as_ref() {
            provider.cleanup().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(token_endpoint: String) -> OAuthConfig {
        OAuthConfig {
            client_id: "client-1".to_string(),
            authorization_endpoint: "https://as.example.com/authorize".to_string(),
            token_endpoint,
            redirect_uri: "http://127.0.0.1:7777/callback".to_string(),
            scope: Some("mcp".to_string()),
            resource: "https://MCP.Example.com/mcp/".to_string(),
        }
    }

    fn seeded_tokens(expired: bool, refresh: Option<&str>) -> OAuthTokens {
        OAuthTokens {
            access_token: "at-old".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            expires_at: Some(if expired {
                Utc::now() - Duration::seconds(10)
            } else {
                Utc::now() + Duration::seconds(3600)
            }),
            scope: None,
        }
    }

    #[test]
    fn test_resource_canonicalized_on_construction() {
        let provider = OAuthProvider::new(test_config("https://as/token".to_string())).unwrap();
        assert_eq!(provider.resource(), "https://mcp.example.com/mcp");
    }

    #[test]
    fn test_invalid_resource_rejected() {
        let mut config = test_config("https://as/token".to_string());
        config.resource = "not a url".to_string();
        assert!(matches!(
            OAuthProvider::new(config),
            Err(AuthError::InvalidResourceUri(_))
        ));
    }

    #[tokio::test]
    async fn test_authorization_url_carries_pkce_and_resource() {
        let provider = OAuthProvider::new(test_config("https://as/token".to_string())).unwrap();
        let pkce = PkcePair::generate();
        let url = provider.authorization_url(&pkce, "state-1").unwrap();
        let parsed = Url::parse(&url).unwrap();

        let pairs: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["code_challenge"], pkce.challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], "state-1");
        assert_eq!(pairs["resource"], "https://mcp.example.com/mcp");
        assert_eq!(pairs["scope"], "mcp");
    }

    #[tokio::test]
    async fn test_headers_serve_fresh_token_without_refresh() {
        let provider = OAuthProvider::new(test_config("https://as/token".to_string())).unwrap();
        provider.set_tokens(seeded_tokens(false, None)).await;

        let headers = provider.headers().await.unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer at-old");
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_with_resource_param() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .and(body_string_contains(
                "resource=https%3A%2F%2Fmcp.example.com%2Fmcp",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-new",
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            OAuthProvider::new(test_config(format!("{}/token", server.uri()))).unwrap();
        provider.set_tokens(seeded_tokens(true, Some("rt-1"))).await;

        let headers = provider.headers().await.unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer at-new");

        // The refresh token survives a response that omits it.
        let tokens = provider.tokens().await.unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_refresh_is_single_flight() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(100))
                    .set_body_json(json!({
                        "access_token": "at-new",
                        "token_type": "Bearer",
                        "expires_in": 3600,
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(
            OAuthProvider::new(test_config(format!("{}/token", server.uri()))).unwrap(),
        );
        provider.set_tokens(seeded_tokens(true, Some("rt-1"))).await;

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.headers().await })
            })
            .collect();

        for task in tasks {
            let headers = task.await.unwrap().unwrap();
            assert_eq!(headers.get("Authorization").unwrap(), "Bearer at-new");
        }
        // wiremock's expect(1) verifies only one refresh hit the endpoint.
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let provider =
            OAuthProvider::new(test_config(format!("{}/token", server.uri()))).unwrap();
        provider.set_tokens(seeded_tokens(true, Some("rt-dead"))).await;

        let result = provider.headers().await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed(_))));
        assert!(provider.tokens().await.is_none());
    }

    #[tokio::test]
    async fn test_challenge_without_refresh_token_demands_reauth() {
        let provider = OAuthProvider::new(test_config("https://as/token".to_string())).unwrap();
        provider.set_tokens(seeded_tokens(false, None)).await;

        let result = provider.handle_challenge("Bearer error=\"invalid_token\"").await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed(_))));
        assert!(provider.tokens().await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_drops_tokens() {
        let provider = OAuthProvider::new(test_config("https://as/token".to_string())).unwrap();
        provider.set_tokens(seeded_tokens(false, None)).await;
        provider.cleanup().await;
        assert!(provider.tokens().await.is_none());
    }

    struct StaticHandler {
        state_echo: bool,
    }

    #[async_trait]
    impl AuthorizationHandler for StaticHandler {
        async fn authorize(&self, authorization_url: &str) -> AuthResult<(String, String)> {
            let url = Url::parse(authorization_url).unwrap();
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            if self.state_echo {
                Ok(("auth-code-1".to_string(), state))
            } else {
                Ok(("auth-code-1".to_string(), "tampered".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_full_authorization_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code-1"))
            .and(body_string_contains("code_verifier="))
            .and(body_string_contains(
                "resource=https%3A%2F%2Fmcp.example.com%2Fmcp",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let provider = OAuthProvider::new(test_config(format!("{}/token", server.uri())))
            .unwrap()
            .with_authorization_handler(Arc::new(StaticHandler { state_echo: true }));

        let headers = provider.headers().await.unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer at-1");
    }

    #[tokio::test]
    async fn test_state_mismatch_rejected() {
        let provider = OAuthProvider::new(test_config("https://as/token".to_string()))
            .unwrap()
            .with_authorization_handler(Arc::new(StaticHandler { state_echo: false }));

        let result = provider.authorize().await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }
}
