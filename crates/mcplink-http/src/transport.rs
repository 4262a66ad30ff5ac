//! HTTP/SSE client transport.
//!
//! JSON-RPC requests go out as `POST <url>` with an `application/json`
//! body; server pushes arrive on a `GET <url>` SSE stream. Both paths feed
//! one receive channel, so consumers see a single ordered message stream.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use mcplink_auth::AuthProvider;
use mcplink_auth::resource_metadata_from_challenge;
use mcplink_protocol::MessageId;
use mcplink_transport_traits::{
    AtomicMetrics, Transport, TransportError, TransportMessage, TransportMessageMetadata,
    TransportMetrics, TransportResult, TransportState, TransportType,
};

use crate::retry::RetryPolicy;
use crate::sse::SseEventParser;

/// Floor for the SSE idle timeout; streams quieter than this are given
/// the benefit of the doubt until a longer idle interval is observed.
const SSE_IDLE_FLOOR: Duration = Duration::from_secs(30);

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// The MCP endpoint URL (POST target and SSE stream)
    pub url: String,
    /// Bounds the connection probe (default 30 s)
    pub connect_timeout: Duration,
    /// Bounds each request (default 60 s)
    pub request_timeout: Duration,
    /// Retry cap for 5xx and network failures (default 3)
    pub max_retries: u32,
    /// Static headers added to every request
    pub headers: HashMap<String, String>,
    /// Whether to hold an SSE stream open for server pushes
    pub sse_enabled: bool,
}

impl HttpTransportConfig {
    /// Configuration for `url` with default timeouts and retries.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            headers: HashMap::new(),
            sse_enabled: true,
        }
    }
}

/// HTTP client transport with authenticated requests and SSE streaming.
pub struct HttpTransport {
    config: HttpTransportConfig,
    http: reqwest::Client,
    auth: Option<Arc<dyn AuthProvider>>,
    retry: RetryPolicy,
    state: Arc<RwLock<TransportState>>,
    metrics: Arc<AtomicMetrics>,
    inbound_tx: mpsc::Sender<TransportMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<TransportMessage>>>,
    sse_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.config.url)
            .field("auth", &self.auth.as_ref().map(|a| a.scheme()))
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for `config`.
    ///
    /// # Errors
    ///
    /// [`TransportError::InvalidUrl`] when the endpoint URL does not parse
    /// as absolute http/https.
    pub fn new(config: HttpTransportConfig) -> TransportResult<Self> {
        let parsed = url::Url::parse(&config.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.url)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TransportError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                config.url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(format!("HTTP client: {e}")))?;

        let (inbound_tx, inbound_rx) = mpsc::channel(1000);
        let retry = RetryPolicy::with_max_attempts(config.max_retries);

        Ok(Self {
            config,
            http,
            auth: None,
            retry,
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            metrics: Arc::new(AtomicMetrics::default()),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            sse_task: Arc::new(Mutex::new(None)),
        })
    }

    /// Attach the authentication provider consulted on every request.
    #[must_use]
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    async fn set_state(&self, new_state: TransportState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            trace!("HTTP transport state: {} -> {}", *state, new_state);
            *state = new_state;
        }
    }

    /// Collect headers for one request: provider headers first, then the
    /// static configured ones.
    async fn request_headers(
        auth: Option<&Arc<dyn AuthProvider>>,
        config: &HttpTransportConfig,
    ) -> TransportResult<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();

        if let Some(provider) = auth {
            for (name, value) in provider.headers().await? {
                if let (Ok(name), Ok(value)) = (
                    header::HeaderName::from_bytes(name.as_bytes()),
                    header::HeaderValue::from_str(&value),
                ) {
                    headers.insert(name, value);
                } else {
                    warn!(header = %name, "Skipping invalid auth header");
                }
            }
        }

        for (name, value) in &config.headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(name.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        Ok(headers)
    }

    /// Turn a 401 response into the structured error the caller needs:
    /// a discovery trigger when the challenge names metadata, a terminal
    /// authentication failure otherwise.
    fn challenge_error(response: &reqwest::Response) -> TransportError {
        // HeaderMap lookup is case-insensitive by construction.
        let Some(challenge) = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
        else {
            return TransportError::AuthenticationFailed(
                "401 response without a WWW-Authenticate challenge".to_string(),
            );
        };

        match resource_metadata_from_challenge(challenge) {
            Some(url) => TransportError::OAuthDiscoveryRequired(url),
            None => TransportError::AuthenticationFailed(format!(
                "401 challenge is not usable for discovery: {challenge}"
            )),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::RequestTimeout {
                operation: format!("POST {}", self.config.url),
                timeout: self.config.request_timeout,
            }
        } else {
            TransportError::NetworkError(e.to_string())
        }
    }

    /// POST one JSON-RPC payload, retrying 5xx and network failures and
    /// answering exactly one 401 with the provider's challenge handler.
    /// When `queue_response` is false the response body is discarded
    /// (used by the connect probe).
    async fn post_json(&self, payload: &[u8], queue_response: bool) -> TransportResult<()> {
        let mut attempt = 0u32;
        let mut challenged = false;

        loop {
            let headers = Self::request_headers(self.auth.as_ref(), &self.config).await?;

            let result = self
                .http
                .post(&self.config.url)
                .headers(headers)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json, text/event-stream")
                .body(payload.to_vec())
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    let mapped = self.map_send_error(e);
                    if matches!(mapped, TransportError::NetworkError(_))
                        && let Some(delay) = self.retry.delay(attempt)
                    {
                        warn!(error = %mapped, attempt, "Network error, retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(mapped);
                }
            };

            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED {
                let challenge_err = Self::challenge_error(&response);

                // Give the provider one shot at recovering (refresh).
                if !challenged
                    && let Some(provider) = &self.auth
                    && let Some(challenge) = response
                        .headers()
                        .get(header::WWW_AUTHENTICATE)
                        .and_then(|v| v.to_str().ok())
                {
                    challenged = true;
                    match provider.handle_challenge(challenge).await {
                        Ok(_) => {
                            debug!("Provider recovered from 401 challenge, retrying");
                            continue;
                        }
                        Err(e) => {
                            debug!(error = %e, "Provider could not answer challenge");
                        }
                    }
                }

                return Err(challenge_err);
            }

            if status.is_server_error() {
                if let Some(delay) = self.retry.delay(attempt) {
                    warn!(status = %status, attempt, "Server error, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                return Err(TransportError::ServerError {
                    code: status.as_u16(),
                    body,
                });
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransportError::ServerError {
                    code: status.as_u16(),
                    body,
                });
            }

            // 202 Accepted: a notification or response was taken without a body.
            if status == reqwest::StatusCode::ACCEPTED || !queue_response {
                return Ok(());
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if content_type.contains("text/event-stream") {
                // The server answered the POST with a short SSE stream;
                // drain it inline so ordering is preserved.
                self.drain_post_sse(response).await?;
            } else {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
                if !body.is_empty() {
                    self.queue_inbound(body).await?;
                }
            }

            return Ok(());
        }
    }

    async fn drain_post_sse(&self, response: reqwest::Response) -> TransportResult<()> {
        let mut stream = response.bytes_stream();
        let mut parser = SseEventParser::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
            for payload in parser.feed(&String::from_utf8_lossy(&chunk)) {
                self.queue_inbound(Bytes::from(payload)).await?;
            }
        }
        Ok(())
    }

    async fn queue_inbound(&self, payload: Bytes) -> TransportResult<()> {
        if serde_json::from_slice::<serde_json::Value>(&payload).is_err() {
            warn!("Dropping non-JSON inbound payload");
            return Ok(());
        }

        let message = to_transport_message(payload);
        self.metrics.record_receive(message.size());
        self.inbound_tx
            .send(message)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))
    }

    /// Connection probe: one POST that only checks reachability and auth.
    async fn probe(&self) -> TransportResult<()> {
        let probe = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "ping",
            "id": format!("probe-{}", Uuid::new_v4()),
        });
        let payload = serde_json::to_vec(&probe)?;

        tokio::time::timeout(
            self.config.connect_timeout,
            self.post_json(&payload, false),
        )
        .await
        .map_err(|_| TransportError::ConnectionTimeout {
            timeout: self.config.connect_timeout,
        })?
    }

    async fn start_sse_stream(&self) {
        let config = self.config.clone();
        let http = self.http.clone();
        let auth = self.auth.clone();
        let retry = RetryPolicy {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            // SSE reconnects indefinitely until the transport is dropped;
            // the per-request policy only shapes the backoff curve.
            max_attempts: u32::MAX,
        };
        let sender = self.inbound_tx.clone();
        let metrics = Arc::clone(&self.metrics);

        let task = tokio::spawn(async move {
            Self::sse_task(config, http, auth, retry, sender, metrics).await;
        });

        *self.sse_task.lock().await = Some(task);
    }

    async fn sse_task(
        config: HttpTransportConfig,
        http: reqwest::Client,
        auth: Option<Arc<dyn AuthProvider>>,
        retry: RetryPolicy,
        sender: mpsc::Sender<TransportMessage>,
        metrics: Arc<AtomicMetrics>,
    ) {
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                let Some(delay) = retry.delay(attempt.min(16)) else {
                    break;
                };
                debug!("SSE reconnect in {delay:?} (attempt {attempt})");
                tokio::time::sleep(delay).await;
            }

            let headers = match Self::request_headers(auth.as_ref(), &config).await {
                Ok(headers) => headers,
                Err(e) => {
                    warn!(error = %e, "SSE stream cannot authenticate; stopping");
                    break;
                }
            };

            let request = http
                .get(&config.url)
                .headers(headers)
                .header(header::ACCEPT, "text/event-stream")
                .timeout(Duration::from_secs(u64::MAX / 2));

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "SSE connect failed");
                    attempt += 1;
                    continue;
                }
            };

            if !response.status().is_success() {
                warn!(status = %response.status(), "SSE endpoint rejected the stream");
                attempt += 1;
                continue;
            }

            debug!("SSE stream established");
            attempt = 0;

            let mut stream = response.bytes_stream();
            let mut parser = SseEventParser::new();

            // Heartbeat-absence detection: idle for more than twice the
            // longest observed gap (with a floor) counts as a disconnect.
            let mut longest_idle = SSE_IDLE_FLOOR;
            let mut last_event = Instant::now();

            loop {
                let idle_limit = longest_idle * 2;
                let chunk = match tokio::time::timeout(idle_limit, stream.next()).await {
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "SSE stream error");
                        break;
                    }
                    Ok(None) => {
                        debug!("SSE stream ended");
                        break;
                    }
                    Err(_) => {
                        warn!("SSE stream idle for {idle_limit:?}, treating as disconnect");
                        break;
                    }
                };

                let gap = last_event.elapsed();
                if gap > longest_idle {
                    longest_idle = gap;
                }
                last_event = Instant::now();

                for payload in parser.feed(&String::from_utf8_lossy(&chunk)) {
                    if serde_json::from_slice::<serde_json::Value>(payload.as_bytes()).is_err() {
                        warn!("Dropping non-JSON SSE event");
                        continue;
                    }
                    let message = to_transport_message(Bytes::from(payload));
                    metrics.record_receive(message.size());
                    if sender.send(message).await.is_err() {
                        debug!("Receive channel closed; stopping SSE task");
                        return;
                    }
                }
            }

            attempt += 1;
        }
    }
}

fn to_transport_message(payload: Bytes) -> TransportMessage {
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

impl Transport for HttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn state(&self) -> Pin<Box<dyn Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { self.state.read().await.clone() })
    }

    fn connect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if matches!(self.state().await, TransportState::Connected) {
                return Ok(());
            }

            self.set_state(TransportState::Connecting).await;

            if let Err(e) = self.probe().await {
                self.set_state(TransportState::Failed {
                    reason: e.to_string(),
                })
                .await;
                error!(error = %e, url = %self.config.url, "Remote transport connect failed");
                return Err(e);
            }

            if self.config.sse_enabled {
                self.start_sse_stream().await;
            }

            self.set_state(TransportState::Connected).await;
            debug!(url = %self.config.url, "HTTP transport connected");
            Ok(())
        })
    }

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if matches!(self.state().await, TransportState::Disconnected) {
                return Ok(());
            }

            self.set_state(TransportState::Disconnecting).await;

            if let Some(task) = self.sse_task.lock().await.take() {
                task.abort();
            }

            if let Some(provider) = &self.auth {
                provider.cleanup().await;
            }

            self.set_state(TransportState::Disconnected).await;
            debug!("HTTP transport disconnected");
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if !matches!(self.state().await, TransportState::Connected) {
                return Err(TransportError::NotConnected);
            }

            self.post_json(&message.payload, true).await?;
            self.metrics.record_send(message.size());
            Ok(())
        })
    }

    fn receive(
        &self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>>
    {
        Box::pin(async move {
            if !matches!(self.state().await, TransportState::Connected) {
                return Err(TransportError::NotConnected);
            }

            let mut receiver = self.inbound_rx.lock().await;
            Ok(receiver.recv().await)
        })
    }

    fn metrics(&self) -> Pin<Box<dyn Future<Output = TransportMetrics> + Send + '_>> {
        Box::pin(async move { self.metrics.snapshot() })
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.config.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcplink_auth::BearerAuthProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> HttpTransportConfig {
        let mut config = HttpTransportConfig::new(format!("{}/mcp", server.uri()));
        config.sse_enabled = false;
        config.connect_timeout = Duration::from_secs(5);
        config.request_timeout = Duration::from_secs(5);
        config
    }

    fn request_message(id: i64) -> TransportMessage {
        let payload = format!(r#"{{"jsonrpc":"2.0","method":"tools/list","id":{id}}}"#);
        to_transport_message(Bytes::from(payload))
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = HttpTransport::new(HttpTransportConfig::new("not a url"));
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));

        let result = HttpTransport::new(HttpTransportConfig::new("ftp://host/x"));
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_connect_and_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "result": {"tools": []},
                "id": 1,
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(&server))
            .unwrap()
            .with_auth_provider(Arc::new(BearerAuthProvider::new("tok")));

        transport.connect().await.unwrap();
        assert_eq!(transport.state().await, TransportState::Connected);

        transport.send(request_message(1)).await.unwrap();
        let response = transport.receive().await.unwrap().unwrap();
        assert_eq!(response.id, MessageId::Number(1));
    }

    #[tokio::test]
    async fn test_401_with_resource_metadata_raises_discovery() {
        let server = MockServer::start().await;
        let metadata_url = "https://mcp.example.com/.well-known/oauth-protected-resource";
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(401).insert_header(
                "WWW-Authenticate",
                format!(r#"Bearer resource_metadata="{metadata_url}""#).as_str(),
            ))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(&server)).unwrap();
        let result = transport.connect().await;

        match result {
            Err(TransportError::OAuthDiscoveryRequired(url)) => assert_eq!(url, metadata_url),
            other => panic!("expected OAuthDiscoveryRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_401_without_metadata_is_authentication_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("WWW-Authenticate", r#"Bearer realm="mcp""#),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(&server)).unwrap();
        let result = transport.connect().await;
        assert!(matches!(
            result,
            Err(TransportError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_401_without_challenge_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(&server)).unwrap();
        let result = transport.connect().await;
        assert!(matches!(
            result,
            Err(TransportError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_5xx_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let mut cfg = config(&server);
        cfg.max_retries = 3;
        let transport = HttpTransport::new(cfg).unwrap();
        transport.connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_4xx_surfaces_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such endpoint"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(&server)).unwrap();
        let result = transport.connect().await;
        match result {
            Err(TransportError::ServerError { code, .. }) => assert_eq!(code, 404),
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_sse_response_is_queued() {
        let server = MockServer::start().await;
        let sse_body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"result\":{},\"id\":7}\n\n";
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_raw(sse_body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(config(&server)).unwrap();
        transport.connect().await.unwrap();
        transport.send(request_message(7)).await.unwrap();

        let message = transport.receive().await.unwrap().unwrap();
        assert_eq!(message.id, MessageId::Number(7));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let server = MockServer::start().await;
        let transport = HttpTransport::new(config(&server)).unwrap();
        let result = transport.send(request_message(1)).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
