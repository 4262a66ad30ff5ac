//! Core transport traits.

use std::future::Future;
use std::pin::Pin;

use crate::config::{TransportState, TransportType};
use crate::error::TransportResult;
use crate::message::TransportMessage;
use crate::metrics::TransportMetrics;

/// The core trait for all transport implementations.
///
/// This trait defines the essential, asynchronous operations for a
/// message-based communication channel. Consumers see only this surface;
/// authentication, framing, and retries are the implementation's business.
///
/// Methods return boxed futures so the trait stays object-safe; impls may
/// use `#[async_trait]`, which desugars to the same signatures.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the current state of the transport.
    fn state(&self) -> Pin<Box<dyn Future<Output = TransportState> + Send + '_>>;

    /// Establishes a connection to the remote endpoint.
    fn connect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Closes the connection to the remote endpoint. Idempotent.
    fn disconnect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Sends a single message over the transport.
    ///
    /// Send order is preserved per transport; concurrent callers are
    /// serialized internally.
    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Receives the next complete message, awaiting until one is available.
    ///
    /// Returns `Ok(None)` when the stream has ended cleanly.
    fn receive(
        &self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>>;

    /// Returns a snapshot of the transport's current performance metrics.
    fn metrics(&self) -> Pin<Box<dyn Future<Output = TransportMetrics> + Send + '_>>;

    /// Returns `true` if the transport is currently in the `Connected` state.
    fn is_connected(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { matches!(self.state().await, TransportState::Connected) })
    }

    /// Returns the endpoint address or identifier for this transport, if applicable.
    fn endpoint(&self) -> Option<String> {
        None
    }
}
