//! Static header providers: Bearer, API key, Basic.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{AuthError, AuthResult};

use super::AuthProvider;

/// A fixed bearer token.
#[derive(Clone)]
pub struct BearerAuthProvider {
    token: String,
}

impl BearerAuthProvider {
    /// Provider for a pre-issued bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for BearerAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for BearerAuthProvider {
    fn scheme(&self) -> &'static str {
        "bearer"
    }

    async fn headers(&self) -> AuthResult<HashMap<String, String>> {
        Ok(HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {}", self.token),
        )]))
    }

    async fn handle_challenge(&self, _challenge: &str) -> AuthResult<HashMap<String, String>> {
        // A static token cannot answer a challenge; the caller rotates it.
        Ok(HashMap::new())
    }

    async fn cleanup(&self) {}
}

/// An API key on a configurable header.
#[derive(Clone)]
pub struct ApiKeyAuthProvider {
    header_name: String,
    prefix: Option<String>,
    key: String,
}

impl ApiKeyAuthProvider {
    /// API key sent as `X-API-Key: <key>`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            header_name: "X-API-Key".to_string(),
            prefix: None,
            key: key.into(),
        }
    }

    /// API key on a custom header, optionally prefixed (`<prefix><key>`).
    pub fn with_header(
        key: impl Into<String>,
        header_name: impl Into<String>,
        prefix: Option<String>,
    ) -> Self {
        Self {
            header_name: header_name.into(),
            prefix,
            key: key.into(),
        }
    }
}

impl std::fmt::Debug for ApiKeyAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuthProvider")
            .field("header_name", &self.header_name)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for ApiKeyAuthProvider {
    fn scheme(&self) -> &'static str {
        "api-key"
    }

    async fn headers(&self) -> AuthResult<HashMap<String, String>> {
        let value = match &self.prefix {
            Some(prefix) => format!("{prefix}{}", self.key),
            None => self.key.clone(),
        };
        Ok(HashMap::from([(self.header_name.clone(), value)]))
    }

    async fn handle_challenge(&self, _challenge: &str) -> AuthResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn cleanup(&self) {}
}

/// RFC 7617 Basic credentials.
#[derive(Clone)]
pub struct BasicAuthProvider {
    username: String,
    password: String,
}

impl BasicAuthProvider {
    /// Provider for a username/password pair.
    ///
    /// # Errors
    ///
    /// RFC 7617 forbids colons in the user-id.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> AuthResult<Self> {
        let username = username.into();
        if username.contains(':') {
            return Err(AuthError::AuthenticationFailed(
                "Basic auth username must not contain ':'".to_string(),
            ));
        }
        Ok(Self {
            username,
            password: password.into(),
        })
    }
}

impl std::fmt::Debug for BasicAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthProvider")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for BasicAuthProvider {
    fn scheme(&self) -> &'static str {
        "basic"
    }

    async fn headers(&self) -> AuthResult<HashMap<String, String>> {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        Ok(HashMap::from([(
            "Authorization".to_string(),
            format!("Basic {encoded}"),
        )]))
    }

    async fn handle_challenge(&self, _challenge: &str) -> AuthResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn cleanup(&self) {}
}
