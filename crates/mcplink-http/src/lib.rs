//! # mcplink-http
//!
//! HTTP client transport for remote MCP servers: JSON-RPC over POST with
//! an SSE stream for server-to-client pushes. Every outbound request takes
//! its headers from the configured
//! [`AuthProvider`](mcplink_auth::AuthProvider); a 401 whose challenge
//! names protected-resource metadata surfaces as
//! [`TransportError::OAuthDiscoveryRequired`](mcplink_transport_traits::TransportError::OAuthDiscoveryRequired)
//! so callers can run the discovery chain and retry.

pub mod config;
pub mod retry;
pub mod sse;
pub mod transport;

pub use config::RemoteServerConfig;
pub use retry::RetryPolicy;
pub use sse::SseEventParser;
pub use transport::{HttpTransport, HttpTransportConfig};
