//! Authentication providers.
//!
//! Transports consult a provider for outbound headers and hand it the
//! `WWW-Authenticate` challenge on a 401. Providers never see the
//! transport; the coupling is one-way.

mod oauth;
mod static_auth;

pub use oauth::{AuthorizationHandler, OAuthConfig, OAuthDiscoveryProvider, OAuthProvider};
pub use static_auth::{ApiKeyAuthProvider, BasicAuthProvider, BearerAuthProvider};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AuthResult;

/// The uniform surface of every authentication scheme.
#[async_trait]
pub trait AuthProvider: Send + Sync + std::fmt::Debug {
    /// Short scheme name for logging ("bearer", "oauth", ...).
    fn scheme(&self) -> &'static str;

    /// Headers to attach to the next outbound request.
    ///
    /// # Errors
    ///
    /// [`crate::AuthError::AuthenticationFailed`] when no usable
    /// authorization can be produced; the transport surfaces this rather
    /// than sending unauthenticated.
    async fn headers(&self) -> AuthResult<HashMap<String, String>>;

    /// React to a `WWW-Authenticate` challenge from a 401.
    ///
    /// Returns replacement headers when the provider could recover (e.g.
    /// by refreshing a token); an error when the caller must intervene.
    async fn handle_challenge(&self, challenge: &str) -> AuthResult<HashMap<String, String>>;

    /// Drop any cached credentials.
    async fn cleanup(&self);
}

/// Extract the `resource_metadata` URL from a Bearer/OAuth challenge.
///
/// Returns `None` when the challenge uses another scheme or carries no
/// `resource_metadata` parameter, in which case a 401 is terminal rather
/// than a discovery trigger.
pub fn resource_metadata_from_challenge(challenge: &str) -> Option<String> {
    let trimmed = challenge.trim();
    let lower = trimmed.to_ascii_lowercase();
    if !lower.starts_with("bearer") && !lower.starts_with("oauth") {
        return None;
    }

    let start = lower.find("resource_metadata=\"")? + "resource_metadata=\"".len();
    let rest = &trimmed[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
