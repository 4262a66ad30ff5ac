//! Standard I/O transport implementation.
//!
//! Owns a child MCP server's stdin/stdout pipes (or any pair of raw async
//! streams), applies the framing codec on the way out and framing
//! reassembly plus the log filter on the way in.
//!
//! # Interior Mutability Pattern
//!
//! - **std::sync::Mutex** for state/config (short-lived locks, never cross .await)
//! - **AtomicMetrics** for lock-free counter updates
//! - **tokio::sync::Mutex** for I/O streams (held across .await points)

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use mcplink_protocol::MessageId;
use mcplink_transport_traits::{
    AtomicMetrics, Transport, TransportConfig, TransportError, TransportMessage,
    TransportMessageMetadata, TransportMetrics, TransportResult, TransportState, TransportType,
};

use crate::filter::LogFilter;
use crate::framing::{Reassembler, chunk_message, parse_frame};

// Boxed async I/O so process pipes and in-memory streams share one shape
type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type LineReader = FramedRead<BufReader<BoxedAsyncRead>, AnyDelimiterCodec>;

/// Configuration for spawning a local MCP server process.
#[derive(Debug, Clone, Default)]
pub struct StdioServerConfig {
    /// Server name, used for logging and env-var lookups
    pub name: String,
    /// Executable path
    pub command: String,
    /// Command-line arguments
    pub args: Vec<String>,
    /// Per-server environment variables
    pub env: HashMap<String, String>,
}

impl StdioServerConfig {
    /// Merge the process-wide environment under this server's own.
    /// The server's entries win on collision.
    pub fn merged_env(&self, global: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = global.clone();
        merged.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Source of stdio streams for the transport
enum StreamSource {
    /// Spawn a child process on connect
    Spawn {
        config: StdioServerConfig,
        global_env: HashMap<String, String>,
    },
    /// Use raw streams (already boxed)
    Raw {
        reader: Option<BoxedAsyncRead>,
        writer: Option<BoxedAsyncWrite>,
    },
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { config, .. } => f.debug_tuple("Spawn").field(&config.command).finish(),
            Self::Raw { .. } => write!(f, "Raw"),
        }
    }
}

/// Standard I/O transport.
///
/// Spawns (or adopts pipes for) a child MCP server, chunks outbound
/// messages through the framing codec, and runs a background reader that
/// splits inbound bytes at newline boundaries, reassembles frames, and
/// drops log noise via the [`LogFilter`].
pub struct StdioTransport {
    /// Transport state (std::sync::Mutex - never crosses await)
    state: Arc<StdMutex<TransportState>>,

    /// Transport configuration (std::sync::Mutex - infrequent access)
    config: Arc<StdMutex<TransportConfig>>,

    /// Lock-free atomic metrics
    metrics: Arc<AtomicMetrics>,

    /// Admission filter applied to every inbound record
    filter: LogFilter,

    /// Source of streams (spawn config or raw pipes)
    stream_source: Arc<TokioMutex<StreamSource>>,

    /// Owned child process, present only when this transport spawned it
    child: Arc<TokioMutex<Option<Child>>>,

    /// Child stdin (tokio::sync::Mutex - crosses await boundaries)
    writer: Arc<TokioMutex<Option<BoxedAsyncWrite>>>,

    /// Message receive channel
    receive_channel: Arc<TokioMutex<Option<mpsc::Receiver<TransportMessage>>>>,

    /// Background reader task handle
    task_handle: Arc<TokioMutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("state", &self.state)
            .field("filter", &self.filter)
            .field("stream_source", &"<StreamSource>")
            .finish()
    }
}

impl StdioTransport {
    /// Transport that spawns `config`'s command on connect, with the global
    /// environment merged under the server's own (server wins).
    pub fn new(config: StdioServerConfig, global_env: HashMap<String, String>) -> Self {
        Self::build(StreamSource::Spawn { config, global_env })
    }

    /// Transport over a pre-spawned child's pipes.
    ///
    /// The child must have been spawned with `stdin(Stdio::piped())` and
    /// `stdout(Stdio::piped())`. The child itself stays with the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the child's stdin or stdout was not piped.
    pub fn from_child(child: &mut Child) -> TransportResult<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::ConfigurationError(
                "Child process stdin was not piped. Use Stdio::piped() when spawning.".to_string(),
            )
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::ConfigurationError(
                "Child process stdout was not piped. Use Stdio::piped() when spawning.".to_string(),
            )
        })?;

        Ok(Self::from_raw(stdout, stdin))
    }

    /// Transport over raw async read/write streams.
    ///
    /// `reader` is what we read from (the peer's stdout); `writer` is what
    /// we write to (the peer's stdin).
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        Self::build(StreamSource::Raw {
            reader: Some(Box::pin(reader)),
            writer: Some(Box::pin(writer)),
        })
    }

    fn build(source: StreamSource) -> Self {
        Self {
            state: Arc::new(StdMutex::new(TransportState::Disconnected)),
            config: Arc::new(StdMutex::new(TransportConfig {
                transport_type: TransportType::Stdio,
                ..Default::default()
            })),
            metrics: Arc::new(AtomicMetrics::default()),
            filter: LogFilter::new(),
            stream_source: Arc::new(TokioMutex::new(source)),
            child: Arc::new(TokioMutex::new(None)),
            writer: Arc::new(TokioMutex::new(None)),
            receive_channel: Arc::new(TokioMutex::new(None)),
            task_handle: Arc::new(TokioMutex::new(None)),
        }
    }

    /// Replace the admission filter (e.g. [`LogFilter::disabled`] for
    /// servers known to emit only protocol traffic).
    #[must_use]
    pub fn with_filter(mut self, filter: LogFilter) -> Self {
        self.filter = filter;
        self
    }

    fn set_state(&self, new_state: TransportState) {
        // std::sync::Mutex: short-lived lock, never crosses await
        let mut state = self.state.lock().expect("state mutex poisoned");
        if *state != new_state {
            trace!("Stdio transport state: {} -> {}", *state, new_state);
            *state = new_state;
        }
    }

    async fn setup_streams(&self) -> TransportResult<()> {
        let mut stream_source = self.stream_source.lock().await;

        let (raw_reader, raw_writer): (BoxedAsyncRead, BoxedAsyncWrite) =
            match &mut *stream_source {
                StreamSource::Spawn { config, global_env } => {
                    let merged = config.merged_env(global_env);
                    debug!(server = %config.name, command = %config.command, "Spawning MCP server process");

                    let mut child = Command::new(&config.command)
                        .args(&config.args)
                        .envs(&merged)
                        .stdin(std::process::Stdio::piped())
                        .stdout(std::process::Stdio::piped())
                        .stderr(std::process::Stdio::inherit())
                        .kill_on_drop(true)
                        .spawn()
                        .map_err(|e| {
                            TransportError::ConnectionFailed(format!(
                                "Failed to spawn {}: {e}",
                                config.command
                            ))
                        })?;

                    let stdin = child.stdin.take().ok_or_else(|| {
                        TransportError::ConnectionFailed("Child stdin not piped".to_string())
                    })?;
                    let stdout = child.stdout.take().ok_or_else(|| {
                        TransportError::ConnectionFailed("Child stdout not piped".to_string())
                    })?;

                    *self.child.lock().await = Some(child);
                    (Box::pin(stdout), Box::pin(stdin))
                }
                StreamSource::Raw { reader, writer } => {
                    let reader = reader.take().ok_or_else(|| {
                        TransportError::ConfigurationError(
                            "Raw reader stream already consumed".to_string(),
                        )
                    })?;
                    let writer = writer.take().ok_or_else(|| {
                        TransportError::ConfigurationError(
                            "Raw writer stream already consumed".to_string(),
                        )
                    })?;
                    (reader, writer)
                }
            };

        *self.writer.lock().await = Some(raw_writer);

        // Frame payloads may split multi-byte sequences across chunks, so
        // the line splitter must be byte-oriented rather than UTF-8 lines.
        let line_reader: LineReader = FramedRead::new(
            BufReader::new(raw_reader),
            AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec()),
        );

        // Bounded channel for backpressure
        let (tx, rx) = mpsc::channel(1000);
        *self.receive_channel.lock().await = Some(rx);

        let filter = self.filter.clone();
        let metrics = Arc::clone(&self.metrics);

        let task_handle = tokio::spawn(Self::reader_task(line_reader, tx, filter, metrics));
        *self.task_handle.lock().await = Some(task_handle);

        Ok(())
    }

    async fn reader_task(
        mut reader: LineReader,
        sender: mpsc::Sender<TransportMessage>,
        filter: LogFilter,
        metrics: Arc<AtomicMetrics>,
    ) {
        let mut reassembler = Reassembler::new();

        while let Some(result) = reader.next().await {
            match result {
                Ok(line) => {
                    let line = Bytes::from(line);

                    // Frames go through reassembly; anything else is
                    // non-frame content and falls through to the filter.
                    let candidate = match parse_frame(&line) {
                        Some(frame) => reassembler.push(frame),
                        None => Some(line),
                    };

                    let Some(bytes) = candidate else { continue };

                    let admitted = match std::str::from_utf8(&bytes) {
                        Ok(text) => filter.admit(text),
                        Err(_) => {
                            trace!("Filtered non-UTF-8 record");
                            false
                        }
                    };
                    if !admitted {
                        continue;
                    }

                    let message = Self::to_transport_message(bytes);
                    metrics.record_receive(message.size());

                    match sender.try_send(message) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("STDIO message channel full, dropping message");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            debug!("Receive channel closed, stopping reader task");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to read from child stdout: {}", e);
                    break;
                }
            }
        }

        debug!("Stdio reader task completed");
    }

    fn to_transport_message(payload: Bytes) -> TransportMessage {
        // Best-effort id extraction; notifications get a fresh UUID.
        let message_id = serde_json::from_slice::<serde_json::Value>(&payload)
            .ok()
            .and_then(|v| match v.get("id") {
                Some(serde_json::Value::String(s)) => Some(MessageId::from(s.clone())),
                Some(serde_json::Value::Number(n)) => n.as_i64().map(MessageId::from),
                _ => None,
            })
            .unwrap_or_else(|| MessageId::from(Uuid::new_v4().to_string()));

        TransportMessage::with_metadata(
            message_id,
            payload,
            TransportMessageMetadata::with_content_type("application/json"),
        )
    }

    fn validate_outbound(message: &TransportMessage) -> TransportResult<()> {
        // Newline-delimited wire: embedded literal newlines would be read
        // as frame boundaries on the far side.
        if message.payload.contains(&b'\n') || message.payload.contains(&b'\r') {
            return Err(TransportError::ProtocolError(
                "Message contains embedded newlines".to_string(),
            ));
        }
        Ok(())
    }
}

impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn state(&self) -> Pin<Box<dyn Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { self.state.lock().expect("state mutex poisoned").clone() })
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if matches!(self.state().await, TransportState::Connected) {
                return Ok(());
            }

            self.set_state(TransportState::Connecting);

            match self.setup_streams().await {
                Ok(()) => {
                    self.metrics.connections.fetch_add(1, Ordering::Relaxed);
                    self.set_state(TransportState::Connected);
                    debug!("Stdio transport connected");
                    Ok(())
                }
                Err(e) => {
                    self.metrics
                        .failed_connections
                        .fetch_add(1, Ordering::Relaxed);
                    self.set_state(TransportState::Failed {
                        reason: e.to_string(),
                    });
                    error!("Failed to connect stdio transport: {}", e);
                    Err(e)
                }
            }
        })
    }

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if matches!(self.state().await, TransportState::Disconnected) {
                return Ok(());
            }

            self.set_state(TransportState::Disconnecting);

            // Close pipes and drain buffers
            *self.writer.lock().await = None;
            *self.receive_channel.lock().await = None;

            if let Some(handle) = self.task_handle.lock().await.take() {
                handle.abort();
            }

            // Terminate the child if we own it
            if let Some(mut child) = self.child.lock().await.take() {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill child process: {}", e);
                }
            }

            self.set_state(TransportState::Disconnected);
            debug!("Stdio transport disconnected");
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state().await;
            if !matches!(state, TransportState::Connected) {
                return Err(TransportError::NotConnected);
            }

            Self::validate_outbound(&message)?;
            let frames = chunk_message(&message.payload);
            let size = message.size();

            let mut writer = self.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                return Err(TransportError::SendFailed(
                    "Writer not available".to_string(),
                ));
            };

            for frame in frames {
                if let Err(e) = writer.write_all(&frame).await {
                    error!("Failed to send frame: {}", e);
                    self.set_state(TransportState::Failed {
                        reason: e.to_string(),
                    });
                    return Err(TransportError::SendFailed(e.to_string()));
                }
            }

            if let Err(e) = writer.flush().await {
                error!("Failed to flush child stdin: {}", e);
                self.set_state(TransportState::Failed {
                    reason: e.to_string(),
                });
                return Err(TransportError::SendFailed(e.to_string()));
            }

            self.metrics.record_send(size);
            trace!("Sent message: {} bytes", size);
            Ok(())
        })
    }

    fn receive(
        &self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state().await;
            if !matches!(state, TransportState::Connected) {
                return Err(TransportError::NotConnected);
            }

            let mut receive_channel = self.receive_channel.lock().await;
            let Some(receiver) = receive_channel.as_mut() else {
                return Err(TransportError::ReceiveFailed(
                    "Receive channel not available".to_string(),
                ));
            };

            // None means the reader task ended: clean end of stream.
            Ok(receiver.recv().await)
        })
    }

    fn metrics(&self) -> Pin<Box<dyn Future<Output = TransportMetrics> + Send + '_>> {
        Box::pin(async move { self.metrics.snapshot() })
    }

    fn endpoint(&self) -> Option<String> {
        Some("stdio://".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merged_env_server_wins() {
        let config = StdioServerConfig {
            name: "test".to_string(),
            command: "server".to_string(),
            args: vec![],
            env: HashMap::from([("PATH_EXTRA".to_string(), "server".to_string())]),
        };
        let global = HashMap::from([
            ("PATH_EXTRA".to_string(), "global".to_string()),
            ("HOME_DIR".to_string(), "/root".to_string()),
        ]);

        let merged = config.merged_env(&global);
        assert_eq!(merged.get("PATH_EXTRA"), Some(&"server".to_string()));
        assert_eq!(merged.get("HOME_DIR"), Some(&"/root".to_string()));
    }

    #[tokio::test]
    async fn test_initial_state_disconnected() {
        let (_, rx) = tokio::io::duplex(64);
        let (tx, _) = tokio::io::duplex(64);
        let transport = StdioTransport::from_raw(rx, tx);
        assert_eq!(transport.state().await, TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (_, rx) = tokio::io::duplex(64);
        let (tx, _) = tokio::io::duplex(64);
        let transport = StdioTransport::from_raw(rx, tx);

        let message = TransportMessage::new(
            MessageId::from("x"),
            Bytes::from_static(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#),
        );
        let result = transport.send(message).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_embedded_newline_rejected() {
        let (_, rx) = tokio::io::duplex(64);
        let (tx, _) = tokio::io::duplex(64);
        let transport = StdioTransport::from_raw(rx, tx);
        transport.connect().await.unwrap();

        let message = TransportMessage::new(
            MessageId::from("x"),
            Bytes::from_static(b"{\"jsonrpc\":\"2.0\",\n\"id\":1}"),
        );
        let result = transport.send(message).await;
        assert!(matches!(result, Err(TransportError::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (_, rx) = tokio::io::duplex(64);
        let (tx, _) = tokio::io::duplex(64);
        let transport = StdioTransport::from_raw(rx, tx);

        transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert_eq!(transport.state().await, TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_raw_streams_consumed_once() {
        let (_, rx) = tokio::io::duplex(64);
        let (tx, _) = tokio::io::duplex(64);
        let transport = StdioTransport::from_raw(rx, tx);

        transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();

        // Raw streams are gone; reconnecting must fail cleanly.
        let result = transport.connect().await;
        assert!(matches!(
            result,
            Err(TransportError::ConfigurationError(_))
        ));
    }
}
