//! OAuth discovery: RFC 9728 protected-resource metadata, RFC 8414 / OIDC
//! authorization-server metadata, and RFC 7591 dynamic client registration.

mod client;
mod types;

pub use client::DiscoveryClient;
pub use types::{
    AuthorizationServerMetadata, ClientRegistrationRequest, ClientRegistrationResponse,
    ProtectedResourceMetadata,
};
