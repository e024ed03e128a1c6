//! HTTP transports for the tool server.
//!
//! - streamable HTTP: `POST {mount}/mcp` carries one JSON-RPC message and gets
//!   the response in the HTTP body (`202` for notifications).
//! - SSE: `GET {mount}/sse` opens an event stream whose first `endpoint` event
//!   names `POST {mount}/messages/?session_id=...`; responses to messages
//!   posted there arrive on the stream as `message` events.

use super::ToolServer;
use crate::config::ServerTransport;
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Clone)]
struct HttpState {
    server: Arc<ToolServer>,
    mount_path: Arc<str>,
    sse_sessions: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>>,
}

impl HttpState {
    fn sse_sender(&self, session_id: &str) -> Option<mpsc::UnboundedSender<Value>> {
        self.sse_sessions.lock().get(session_id).cloned()
    }

    fn drop_sse_session(&self, session_id: &str) {
        self.sse_sessions.lock().remove(session_id);
    }
}

/// `"/bsky/"` → `"/bsky"`, `""` or `"/"` → `""`.
fn normalize_mount(mount_path: &str) -> String {
    let trimmed = mount_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Router exposing `server` over `transport`. `Stdio` yields an empty router.
pub fn router(server: Arc<ToolServer>, transport: ServerTransport, mount_path: &str) -> Router {
    let mount = normalize_mount(mount_path);
    let state = HttpState {
        server,
        mount_path: Arc::from(mount.as_str()),
        sse_sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let router = match transport {
        ServerTransport::StreamableHttp => {
            Router::new().route(&format!("{mount}/mcp"), post(handle_streamable))
        }
        ServerTransport::Sse => Router::new()
            .route(&format!("{mount}/sse"), get(handle_sse_connect))
            .route(&format!("{mount}/messages/"), post(handle_sse_message)),
        ServerTransport::Stdio => Router::new(),
    };
    router.with_state(state)
}

/// Bind `host:port` and serve until the listener fails.
pub async fn serve_http(
    server: Arc<ToolServer>,
    transport: ServerTransport,
    host: &str,
    port: u16,
    mount_path: &str,
) -> Result<()> {
    let listener = TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        ?transport,
        mount = %normalize_mount(mount_path),
        tools = server.tools().len(),
        "Tool server listening over HTTP"
    );

    axum::serve(listener, router(server, transport, mount_path))
        .await
        .context("HTTP server failed")
}

async fn handle_streamable(State(state): State<HttpState>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    match state.server.handle_text(&text).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_sse_connect(State(state): State<HttpState>) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    state.sse_sessions.lock().insert(session_id.clone(), tx);
    tracing::info!(%session_id, "SSE client connected");

    let endpoint = format!("{}/messages/?session_id={session_id}", state.mount_path);
    let first = tokio_stream::once(Ok::<_, Infallible>(
        Event::default().event("endpoint").data(endpoint),
    ));
    let messages = UnboundedReceiverStream::new(rx)
        .map(|message| Ok(Event::default().event("message").data(message.to_string())));

    Sse::new(first.chain(messages)).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

async fn handle_sse_message(
    State(state): State<HttpState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let Some(tx) = state.sse_sender(&query.session_id) else {
        return (StatusCode::NOT_FOUND, "Could not find session").into_response();
    };

    let text = String::from_utf8_lossy(&body);
    if let Some(response) = state.server.handle_text(&text).await {
        if tx.send(response).is_err() {
            tracing::debug!(session_id = %query.session_id, "SSE client gone");
            state.drop_sse_session(&query.session_id);
            return (StatusCode::NOT_FOUND, "Session closed").into_response();
        }
    }
    (StatusCode::ACCEPTED, "Accepted").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct PingTool;

    #[async_trait]
    impl Tool for PingTool {
        fn name(&self) -> &str {
            "ping_tool"
        }

        fn description(&self) -> &str {
            "Answer pong"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::ok("pong"))
        }
    }

    async fn spawn(transport: ServerTransport, mount: &str) -> String {
        let server = Arc::new(ToolServer::new(vec![Box::new(PingTool)]));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(server, transport, mount);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn mount_paths_are_normalized() {
        assert_eq!(normalize_mount(""), "");
        assert_eq!(normalize_mount("/"), "");
        assert_eq!(normalize_mount("bsky/"), "/bsky");
        assert_eq!(normalize_mount("/a/b"), "/a/b");
    }

    #[tokio::test]
    async fn streamable_http_answers_in_body() {
        let base = spawn(ServerTransport::StreamableHttp, "/bsky").await;
        let client = reqwest::Client::new();

        let response: Value = client
            .post(format!("{base}/bsky/mcp"))
            .json(&json!({
                "jsonrpc": "2.0", "id": 7, "method": "tools/call",
                "params": {"name": "ping_tool", "arguments": {}}
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"]["content"][0]["text"], "pong");

        let notification = client
            .post(format!("{base}/bsky/mcp"))
            .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .send()
            .await
            .unwrap();
        assert_eq!(notification.status(), reqwest::StatusCode::ACCEPTED);

        let garbage: Value = client
            .post(format!("{base}/bsky/mcp"))
            .body("{nope")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(garbage["error"]["code"], -32700);

        let unmounted = client.post(format!("{base}/mcp")).send().await.unwrap();
        assert_eq!(unmounted.status(), reqwest::StatusCode::NOT_FOUND);
    }

    /// Read SSE chunks until `needle` shows up.
    async fn read_until(response: &mut reqwest::Response, buffer: &mut String, needle: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !buffer.contains(needle) {
                let chunk = response.chunk().await.unwrap().expect("stream ended early");
                buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("timed out waiting for SSE data");
    }

    #[tokio::test]
    async fn sse_delivers_responses_on_the_stream() {
        let base = spawn(ServerTransport::Sse, "").await;
        let client = reqwest::Client::new();

        let mut stream = client.get(format!("{base}/sse")).send().await.unwrap();
        assert!(stream.status().is_success());

        let mut buffer = String::new();
        read_until(&mut stream, &mut buffer, "session_id=").await;
        let endpoint = buffer
            .lines()
            .find_map(|line| line.strip_prefix("data:"))
            .unwrap()
            .trim()
            .to_string();
        assert!(endpoint.starts_with("/messages/?session_id="));

        let accepted = client
            .post(format!("{base}{endpoint}"))
            .json(&json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}))
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);

        read_until(&mut stream, &mut buffer, "event: message").await;
        read_until(&mut stream, &mut buffer, "\"id\":3").await;
    }

    #[tokio::test]
    async fn sse_message_for_unknown_session_is_not_found() {
        let base = spawn(ServerTransport::Sse, "").await;
        let response = reqwest::Client::new()
            .post(format!("{base}/messages/?session_id=nope"))
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
