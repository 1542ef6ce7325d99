//! MCP JSON-RPC sessions over the two transport kinds
//!
//! Both sessions expose the same `RemoteService` surface. The streamable
//! HTTP session does one POST per message and reads the answer from the
//! response body, JSON or SSE-framed. The SSE session holds one long-lived
//! event stream for server-to-client traffic and POSTs requests to the
//! endpoint the stream announces.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

use crate::headers::HeaderSet;
use crate::mcp::events::SseParser;
use crate::remote::{Capability, RemoteError, RemoteRequest, RemoteService};
use crate::transport::TransportDescriptor;

const JSONRPC_VERSION: &str = "2.0";
const PROTOCOL_VERSION: &str = "2024-11-05";
const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Idle read timeout applied when none is configured
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-request override keeping the long-lived event stream exempt from the
/// client's total timeout; idleness is enforced per read instead
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<Capability>,
}

/// Map a reqwest failure onto the enumerable transient kinds
pub(crate) fn classify_reqwest(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        if error.is_connect() {
            RemoteError::ConnectTimeout(error.to_string())
        } else {
            RemoteError::ReadTimeout(error.to_string())
        }
    } else if error.is_connect() {
        RemoteError::Connect(error.to_string())
    } else if error.is_body() || error.is_decode() {
        RemoteError::Read(error.to_string())
    } else if error.is_request() {
        RemoteError::Write(error.to_string())
    } else {
        RemoteError::Protocol(error.to_string())
    }
}

fn build_header_map(headers: &HeaderSet) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(header = %key, "skipping invalid header"),
        }
    }
    map
}

fn request_body(id: Option<i64>, method: &str, params: Option<&Value>) -> Value {
    let mut body = json!({ "jsonrpc": JSONRPC_VERSION, "method": method });
    if let Some(id) = id {
        body["id"] = json!(id);
    }
    if let Some(params) = params {
        body["params"] = params.clone();
    }
    body
}

fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": "mcp-bridge", "version": crate::VERSION },
    })
}

fn unwrap_response(response: RpcResponse) -> Result<Value, RemoteError> {
    if let Some(error) = response.error {
        return Err(RemoteError::Application {
            code: error.code,
            message: error.message,
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

fn parse_tools(result: Value) -> Result<Vec<Capability>, RemoteError> {
    let parsed: ToolsListResult = serde_json::from_value(result)
        .map_err(|e| RemoteError::Protocol(format!("malformed tools/list result: {e}")))?;
    Ok(parsed.tools)
}

// ---------------- streamable HTTP ----------------

/// Session over the streamable HTTP transport
pub struct HttpSession {
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    idle_timeout: Duration,
    next_id: AtomicI64,
    session_id: Mutex<Option<String>>,
}

impl HttpSession {
    pub fn new(client: reqwest::Client, descriptor: &TransportDescriptor) -> Self {
        Self {
            client,
            url: descriptor.url.clone(),
            headers: build_header_map(&descriptor.headers),
            idle_timeout: descriptor.sse_read_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            next_id: AtomicI64::new(1),
            session_id: Mutex::new(None),
        }
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, RemoteError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        let session = self.session_id.lock().unwrap().clone();
        if let Some(session) = session {
            request = request.header(SESSION_ID_HEADER, session);
        }
        let response = request.send().await.map_err(classify_reqwest)?;

        if let Some(session) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().unwrap() = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// POST one request and read its answer, whichever framing the server picked
    async fn request(&self, method: &str, params: Option<&Value>) -> Result<Value, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = request_body(Some(id), method, params);
        let response = self.post(&body).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            self.read_stream_response(response, id).await
        } else {
            let parsed: RpcResponse = response.json().await.map_err(classify_reqwest)?;
            unwrap_response(parsed)
        }
    }

    /// Scan an SSE-framed response body for the message answering `id`
    async fn read_stream_response(
        &self,
        response: reqwest::Response,
        id: i64,
    ) -> Result<Value, RemoteError> {
        let mut stream = Box::pin(response.bytes_stream());
        let mut parser = SseParser::new();
        loop {
            let chunk = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .map_err(|_| {
                    RemoteError::ReadTimeout("idle timeout on response stream".to_string())
                })?;
            let chunk = match chunk {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Err(classify_reqwest(e)),
                None => {
                    return Err(RemoteError::Protocol(
                        "response stream ended before an answer arrived".to_string(),
                    ))
                }
            };
            for event in parser.feed(&String::from_utf8_lossy(&chunk)) {
                if event.event != "message" {
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<RpcResponse>(&event.data) else {
                    continue;
                };
                if parsed.id.as_ref().and_then(Value::as_i64) == Some(id) {
                    return unwrap_response(parsed);
                }
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<&Value>) -> Result<(), RemoteError> {
        let body = request_body(None, method, params);
        self.post(&body).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteService for HttpSession {
    async fn open(&self) -> Result<(), RemoteError> {
        self.request("initialize", Some(&initialize_params()))
            .await?;
        self.notify("notifications/initialized", None).await
    }

    async fn close(&self) -> Result<(), RemoteError> {
        let session = self.session_id.lock().unwrap().take();
        if let Some(session) = session {
            // teardown is best effort; not every server supports DELETE
            let result = self
                .client
                .delete(self.url.clone())
                .headers(self.headers.clone())
                .header(SESSION_ID_HEADER, session)
                .send()
                .await;
            if let Err(e) = result {
                tracing::debug!(error = %e, "session delete failed");
            }
        }
        Ok(())
    }

    async fn list_capabilities(&self) -> Result<Vec<Capability>, RemoteError> {
        let result = self.request("tools/list", None).await?;
        parse_tools(result)
    }

    async fn invoke(&self, request: RemoteRequest) -> Result<Value, RemoteError> {
        self.request(&request.method, request.params.as_ref()).await
    }
}

// ---------------- SSE ----------------

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<RpcResponse>>>>;

struct SseState {
    post_url: Url,
    pending: PendingMap,
    reader: tokio::task::JoinHandle<()>,
}

impl Drop for SseState {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Session over the SSE transport
pub struct SseSession {
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    idle_timeout: Duration,
    next_id: AtomicI64,
    state: tokio::sync::Mutex<Option<SseState>>,
}

impl SseSession {
    pub fn new(client: reqwest::Client, descriptor: &TransportDescriptor) -> Self {
        Self {
            client,
            url: descriptor.url.clone(),
            headers: build_header_map(&descriptor.headers),
            idle_timeout: descriptor.sse_read_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            next_id: AtomicI64::new(1),
            state: tokio::sync::Mutex::new(None),
        }
    }

    async fn post_target(&self) -> Result<(Url, PendingMap), RemoteError> {
        let state = self.state.lock().await;
        let state = state
            .as_ref()
            .ok_or_else(|| RemoteError::Write("session not open".to_string()))?;
        Ok((state.post_url.clone(), state.pending.clone()))
    }

    async fn send_request(&self, method: &str, params: Option<&Value>) -> Result<Value, RemoteError> {
        let (post_url, pending) = self.post_target().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(id, tx);

        let body = request_body(Some(id), method, params);
        let posted = self
            .client
            .post(post_url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await;
        let response = match posted {
            Ok(response) => response,
            Err(e) => {
                pending.lock().unwrap().remove(&id);
                return Err(classify_reqwest(e));
            }
        };
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            pending.lock().unwrap().remove(&id);
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }

        // the answer arrives over the event stream; waiting for it is a read
        match tokio::time::timeout(self.idle_timeout, rx).await {
            Err(_) => {
                pending.lock().unwrap().remove(&id);
                Err(RemoteError::ReadTimeout(
                    "timed out waiting for a response on the event stream".to_string(),
                ))
            }
            Ok(Err(_)) => Err(RemoteError::Read(
                "event stream closed while awaiting a response".to_string(),
            )),
            Ok(Ok(parsed)) => unwrap_response(parsed),
        }
    }

    async fn send_notification(&self, method: &str, params: Option<&Value>) -> Result<(), RemoteError> {
        let (post_url, _) = self.post_target().await?;
        let body = request_body(None, method, params);
        let response = self
            .client
            .post(post_url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteService for SseSession {
    async fn open(&self) -> Result<(), RemoteError> {
        {
            let mut guard = self.state.lock().await;
            if guard.is_some() {
                return Ok(());
            }

            let response = self
                .client
                .get(self.url.clone())
                .headers(self.headers.clone())
                .header(ACCEPT, "text/event-stream")
                .timeout(STREAM_REQUEST_TIMEOUT)
                .send()
                .await
                .map_err(classify_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                // wrong flavor or wrong path; eligible for the auto fallback
                return Err(RemoteError::Protocol(format!(
                    "event stream request rejected with status {status}"
                )));
            }
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            if !content_type.starts_with("text/event-stream") {
                return Err(RemoteError::Protocol(format!(
                    "expected text/event-stream, got '{content_type}'"
                )));
            }

            let mut stream = Box::pin(response.bytes_stream());
            let mut parser = SseParser::new();

            // the first event names the endpoint requests are POSTed to
            let endpoint = loop {
                let chunk = tokio::time::timeout(self.idle_timeout, stream.next())
                    .await
                    .map_err(|_| {
                        RemoteError::ReadTimeout(
                            "idle timeout waiting for the endpoint event".to_string(),
                        )
                    })?;
                let chunk = match chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => return Err(classify_reqwest(e)),
                    None => {
                        return Err(RemoteError::Protocol(
                            "event stream closed before the endpoint event".to_string(),
                        ))
                    }
                };
                let mut endpoint = None;
                for event in parser.feed(&String::from_utf8_lossy(&chunk)) {
                    if event.event == "endpoint" {
                        endpoint = Some(event.data);
                        break;
                    }
                }
                if let Some(endpoint) = endpoint {
                    break endpoint;
                }
            };
            let post_url = self.url.join(&endpoint).map_err(|e| {
                RemoteError::Protocol(format!("invalid endpoint '{endpoint}': {e}"))
            })?;

            let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
            let reader = tokio::spawn(read_stream(
                stream,
                parser,
                pending.clone(),
                self.idle_timeout,
            ));

            *guard = Some(SseState {
                post_url,
                pending,
                reader,
            });
        }

        self.send_request("initialize", Some(&initialize_params()))
            .await?;
        self.send_notification("notifications/initialized", None)
            .await
    }

    async fn close(&self) -> Result<(), RemoteError> {
        // dropping the state aborts the reader and wakes pending calls
        self.state.lock().await.take();
        Ok(())
    }

    async fn list_capabilities(&self) -> Result<Vec<Capability>, RemoteError> {
        let result = self.send_request("tools/list", None).await?;
        parse_tools(result)
    }

    async fn invoke(&self, request: RemoteRequest) -> Result<Value, RemoteError> {
        self.send_request(&request.method, request.params.as_ref())
            .await
    }
}

/// Routes message events from the stream to the calls awaiting them
async fn read_stream<S, B>(
    mut stream: S,
    mut parser: SseParser,
    pending: PendingMap,
    idle_timeout: Duration,
) where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    loop {
        let chunk = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Err(_) => {
                tracing::debug!("event stream idle timeout");
                break;
            }
            Ok(None) => {
                tracing::debug!("event stream ended");
                break;
            }
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "event stream read error");
                break;
            }
            Ok(Some(Ok(chunk))) => chunk,
        };
        for event in parser.feed(&String::from_utf8_lossy(chunk.as_ref())) {
            if event.event != "message" {
                continue;
            }
            match serde_json::from_str::<RpcResponse>(&event.data) {
                Ok(parsed) => {
                    if let Some(id) = parsed.id.as_ref().and_then(Value::as_i64) {
                        if let Some(tx) = pending.lock().unwrap().remove(&id) {
                            let _ = tx.send(parsed);
                        }
                    }
                }
                Err(e) => tracing::debug!(error = %e, "undecodable message event"),
            }
        }
    }
    // waking every pending call lets it fail fast instead of timing out
    pending.lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shapes() {
        let body = request_body(Some(7), "tools/call", Some(&json!({"name": "x"})));
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 7);
        assert_eq!(body["method"], "tools/call");
        assert_eq!(body["params"]["name"], "x");

        let notification = request_body(None, "notifications/initialized", None);
        assert!(notification.get("id").is_none());
        assert!(notification.get("params").is_none());
    }

    #[test]
    fn test_unwrap_response_success() {
        let response: RpcResponse =
            serde_json::from_value(json!({"id": 1, "result": {"ok": true}})).unwrap();
        assert_eq!(unwrap_response(response).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_unwrap_response_error_becomes_application() {
        let response: RpcResponse = serde_json::from_value(
            json!({"id": 1, "error": {"code": -32601, "message": "no such method"}}),
        )
        .unwrap();
        let error = unwrap_response(response).unwrap_err();
        assert!(matches!(
            error,
            RemoteError::Application { code: -32601, .. }
        ));
    }

    #[test]
    fn test_parse_tools() {
        let tools = parse_tools(json!({"tools": [{"name": "search"}, {"name": "fetch"}]})).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "search");
    }

    #[test]
    fn test_parse_tools_tolerates_empty_result() {
        assert!(parse_tools(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_parse_tools_rejects_malformed_result() {
        let error = parse_tools(json!({"tools": "nope"})).unwrap_err();
        assert!(matches!(error, RemoteError::Protocol(_)));
    }

    #[test]
    fn test_header_map_skips_invalid_entries() {
        let mut headers = HeaderSet::new();
        headers.insert("Authorization".to_string(), "Bearer x".to_string());
        headers.insert("bad header name".to_string(), "v".to_string());
        let map = build_header_map(&headers);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("authorization"));
    }
}
