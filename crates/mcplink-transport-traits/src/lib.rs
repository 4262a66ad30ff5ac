//! # mcplink-transport-traits
//!
//! The narrow surface every transport consumer sees: a [`Transport`] is
//! something that can `connect`, `send`, `receive`, and `disconnect`.
//! Concrete transports (stdio, HTTP/SSE) live in their own crates and
//! depend only on this one.

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod traits;

pub use config::{TransportConfig, TransportState, TransportType};
pub use error::{TransportError, TransportResult};
pub use message::{TransportMessage, TransportMessageMetadata};
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use traits::Transport;
