//! JSON-RPC protocol layer: id assignment, the pending-request table, and
//! the reader task that routes responses back to their waiters.
//!
//! Multiple outstanding calls are permitted; responses match by id.
//! Orphan responses (no waiter) are logged and dropped. Notifications
//! flow into a side channel the owner can drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, trace, warn};

use mcplink_protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpError, McpResult,
    MessageId,
};
use mcplink_transport_traits::{Transport, TransportMessage};

type PendingTable = Arc<DashMap<MessageId, oneshot::Sender<JsonRpcResponse>>>;

/// Correlates requests with responses over one transport.
pub(crate) struct ProtocolClient<T: Transport> {
    transport: Arc<T>,
    next_id: AtomicI64,
    pending: PendingTable,
    notifications_tx: mpsc::Sender<JsonRpcNotification>,
    notifications_rx: Mutex<Option<mpsc::Receiver<JsonRpcNotification>>>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Transport + 'static> ProtocolClient<T> {
    pub(crate) fn new(transport: T) -> Self {
        let (notifications_tx, notifications_rx) = mpsc::channel(256);
        Self {
            transport: Arc::new(transport),
            next_id: AtomicI64::new(1),
            pending: Arc::new(DashMap::new()),
            notifications_tx,
            notifications_rx: Mutex::new(Some(notifications_rx)),
            reader_task: Mutex::new(None),
        }
    }

    /// Take the notification stream. Single consumer; later calls get `None`.
    pub(crate) async fn take_notifications(
        &self,
    ) -> Option<mpsc::Receiver<JsonRpcNotification>> {
        self.notifications_rx.lock().await.take()
    }

    /// Connect the transport and start routing its messages.
    pub(crate) async fn connect(&self) -> McpResult<()> {
        self.transport.connect().await.map_err(McpError::from)?;

        let transport = Arc::clone(&self.transport);
        let pending = Arc::clone(&self.pending);
        let notifications = self.notifications_tx.clone();

        let task = tokio::spawn(async move {
            Self::reader_loop(transport, pending, notifications).await;
        });
        *self.reader_task.lock().await = Some(task);
        Ok(())
    }

    async fn reader_loop(
        transport: Arc<T>,
        pending: PendingTable,
        notifications: mpsc::Sender<JsonRpcNotification>,
    ) {
        loop {
            let message = match transport.receive().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("Transport stream ended");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "Transport receive failed; stopping reader");
                    break;
                }
            };

            let parsed = match JsonRpcMessage::parse_many(&message.payload) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable message");
                    continue;
                }
            };

            for item in parsed {
                match item {
                    JsonRpcMessage::Response(response) => {
                        Self::route_response(&pending, response);
                    }
                    JsonRpcMessage::Notification(notification) => {
                        trace!(method = %notification.method, "Server notification");
                        if notifications.try_send(notification).is_err() {
                            debug!("Notification channel full or closed; dropping");
                        }
                    }
                    JsonRpcMessage::Request(request) => {
                        // Server-initiated requests (sampling etc.) are not
                        // part of this client's surface.
                        debug!(method = %request.method, "Ignoring server-initiated request");
                    }
                }
            }
        }

        // Wake every waiter so callers see a transport error, not a hang.
        pending.clear();
    }

    fn route_response(pending: &PendingTable, response: JsonRpcResponse) {
        let Some(id) = response.id.as_message_id().cloned() else {
            warn!("Dropping response with null id");
            return;
        };

        match pending.remove(&id) {
            Some((_, waiter)) => {
                if waiter.send(response).is_err() {
                    trace!(id = %id, "Waiter gone (timed out or cancelled)");
                }
            }
            None => {
                warn!(id = %id, "Dropping orphan response with no matching request");
            }
        }
    }

    /// Send a request and await its typed response within `timeout`.
    pub(crate) async fn request<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> McpResult<R> {
        let response = self.request_raw(method, params, timeout).await?;

        if let Some(error) = response.error() {
            return Err(McpError::rpc(error.code, error.message.clone()));
        }

        serde_json::from_value(response.result().cloned().unwrap_or_default())
            .map_err(|e| McpError::InvalidResponse(format!("{method}: {e}")))
    }

    /// Send a request and await the raw JSON-RPC response.
    pub(crate) async fn request_raw(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> McpResult<JsonRpcResponse> {
        let (id, rx) = self.send_request(method, params).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Reader task dropped the sender: connection went away.
                Err(McpError::Transport(
                    "Connection closed while awaiting response".to_string(),
                ))
            }
            Err(_) => {
                self.pending.remove(&id);
                Err(McpError::RequestTimeout(format!(
                    "{method} after {timeout:?}"
                )))
            }
        }
    }

    /// Send a request and return its id plus the waiter, without awaiting.
    pub(crate) async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> McpResult<(MessageId, oneshot::Receiver<JsonRpcResponse>)> {
        let id = MessageId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = JsonRpcRequest::new(id.clone(), method, params);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        let payload = serde_json::to_vec(&request)?;
        let send_result = self
            .transport
            .send(TransportMessage::new(id.clone(), Bytes::from(payload)))
            .await;

        if let Err(e) = send_result {
            self.pending.remove(&id);
            return Err(McpError::from(e));
        }

        Ok((id, rx))
    }

    /// Drop the waiter for `id` (cancellation path).
    pub(crate) fn abandon(&self, id: &MessageId) {
        self.pending.remove(id);
    }

    /// Send a notification (no response expected, bypasses the table).
    pub(crate) async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> McpResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let payload = serde_json::to_vec(&notification)?;

        self.transport
            .send(TransportMessage::new(
                MessageId::from(format!("notify-{method}")),
                Bytes::from(payload),
            ))
            .await
            .map_err(McpError::from)
    }

    /// Stop the reader and disconnect the transport.
    pub(crate) async fn disconnect(&self) -> McpResult<()> {
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        self.pending.clear();
        self.transport.disconnect().await.map_err(McpError::from)
    }
}

impl<T: Transport> std::fmt::Debug for ProtocolClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("pending", &self.pending.len())
            .finish()
    }
}
