//! Authentication error types.

use thiserror::Error;

/// A specialized `Result` for authentication operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Errors raised by authentication providers and the OAuth discovery chain.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum AuthError {
    /// No usable authorization could be produced.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A 401 challenge pointed at protected-resource metadata; the caller
    /// should run discovery against the carried URL.
    #[error("OAuth discovery required: {0}")]
    OAuthDiscoveryRequired(String),

    /// The discovery chain started but could not complete.
    #[error("OAuth discovery failed: {0}")]
    OAuthDiscoveryFailed(String),

    /// The authorization server does not advertise S256 PKCE support.
    #[error("Authorization server does not support S256 PKCE")]
    PkceNotSupported,

    /// The resource URI could not be canonicalized per RFC 8707.
    #[error("Invalid resource URI: {0}")]
    InvalidResourceUri(String),

    /// The `state` returned from the browser step does not match ours.
    #[error("Authorization state mismatch")]
    StateMismatch,

    /// A network-level failure while talking to an OAuth endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// An OAuth endpoint answered with an unusable body.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<AuthError> for mcplink_transport_traits::TransportError {
    fn from(err: AuthError) -> Self {
        mcplink_transport_traits::TransportError::AuthenticationFailed(err.to_string())
    }
}
