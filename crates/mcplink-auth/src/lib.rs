//! # mcplink-auth
//!
//! Authentication for remote MCP servers: static header providers (Bearer,
//! API key, Basic), OAuth 2.1 with PKCE and RFC 8707 resource indicators,
//! and the WWW-Authenticate-driven discovery chain (RFC 9728 protected
//! resource metadata, RFC 8414 / OIDC authorization-server metadata,
//! RFC 7591 dynamic client registration).
//!
//! Every provider exposes the same narrow surface — [`AuthProvider`] — so
//! transports never know which scheme is in play.

pub mod config;
pub mod discovery;
pub mod error;
pub mod pkce;
pub mod providers;
pub mod resource;
pub mod tokens;

pub use config::{AuthConfig, provider_from_config, provider_from_env};
pub use discovery::{
    AuthorizationServerMetadata, ClientRegistrationResponse, DiscoveryClient,
    ProtectedResourceMetadata,
};
pub use error::{AuthError, AuthResult};
pub use pkce::PkcePair;
pub use providers::{
    ApiKeyAuthProvider, AuthProvider, AuthorizationHandler, BasicAuthProvider,
    BearerAuthProvider, OAuthConfig, OAuthDiscoveryProvider, OAuthProvider,
    resource_metadata_from_challenge,
};
pub use resource::canonical_resource_uri;
pub use tokens::OAuthTokens;
