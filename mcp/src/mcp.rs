//! MCP (Model Context Protocol) JSON-RPC handler.
//!
//! [`handle_message`] answers one JSON-RPC 2.0 message and is shared by both
//! transports: [`run_stdio`] here (one message per line on stdin, responses
//! on stdout) and the HTTP transport in [`crate::http`].
//!
//! ## Supported methods
//!
//! | Method              | Description                      |
//! |---------------------|----------------------------------|
//! | `initialize`        | Handshake, returns capabilities  |
//! | `tools/list`        | List available tool definitions  |
//! | `tools/call`        | Execute a tool and return result |
//! | `ping`              | Liveness check                   |
//!
//! Notifications (`notifications/initialized`, `notifications/cancelled`) are
//! acknowledged silently.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::backend::Backend;
use crate::session::SessionManager;
use crate::tools;

const SERVER_NAME: &str = "CiscoURADKitMCP";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Answer one parsed JSON-RPC message. Returns `None` for notifications.
pub async fn handle_message<B: Backend>(
    request: Value,
    sessions: &SessionManager<B>,
) -> Option<Value> {
    let id = request.get("id").cloned();
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");

    // Notifications (no id): acknowledge silently
    let Some(id) = id else {
        match method {
            "notifications/initialized" | "notifications/cancelled" => {}
            _ => debug!(method, "Unknown notification"),
        }
        return None;
    };

    let response = match method {
        "initialize" => handle_initialize(),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "result": { "tools": tools::tool_definitions() }
        }),
        "tools/call" => handle_tools_call(&request, sessions).await,
        "ping" => json!({ "jsonrpc": "2.0", "result": {} }),
        _ => json!({
            "jsonrpc": "2.0",
            "error": {
                "code": -32601,
                "message": format!("Method not found: {}", method)
            }
        }),
    };

    Some(inject_id(response, id))
}

/// JSON-RPC response for a message that is not valid JSON.
pub fn parse_error(e: &serde_json::Error) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": {
            "code": -32700,
            "message": format!("Parse error: {}", e)
        }
    })
}

/// Run the MCP server on stdio, processing JSON-RPC requests until EOF.
pub async fn run_stdio<B: Backend>(sessions: Arc<SessionManager<B>>) {
    info!("Serving MCP on stdio");
    serve_lines(
        sessions,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;
    info!("stdin closed");
}

/// Read one JSON-RPC message per line from `reader` until EOF.
///
/// `tools/call` requests run on their own tasks so a slow device does not
/// hold up other calls; everything is written through a single writer task.
async fn serve_lines<B, R, W>(sessions: Arc<SessionManager<B>>, mut reader: R, output: W)
where
    B: Backend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Value>(64);
    let writer = tokio::spawn(write_responses(rx, output));
    let mut in_flight = JoinSet::new();
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "stdin read error");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                let _ = tx.send(parse_error(&e)).await;
                continue;
            }
        };

        if request.get("method").and_then(Value::as_str) == Some("tools/call") {
            let sessions = Arc::clone(&sessions);
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = handle_message(request, &sessions).await {
                    let _ = tx.send(response).await;
                }
            });
        } else if let Some(response) = handle_message(request, &sessions).await {
            let _ = tx.send(response).await;
        }

        // Reap finished calls so the set does not grow without bound
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    drop(tx);
    let _ = writer.await;
}

/// Handle `initialize`: return protocol version, capabilities, and server info.
fn handle_initialize() -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        }
    })
}

/// Handle `tools/call`: dispatch to the appropriate tool handler.
async fn handle_tools_call<B: Backend>(request: &Value, sessions: &SessionManager<B>) -> Value {
    let params = request.get("params").cloned().unwrap_or(json!({}));
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let result = tools::handle_tool_call(name, &args, sessions).await;

    let mut response_result = json!({
        "content": result.content
    });
    if result.is_error {
        response_result["isError"] = json!(true);
    }

    json!({
        "jsonrpc": "2.0",
        "result": response_result
    })
}

/// Inject the request `id` into a response object.
fn inject_id(mut response: Value, id: Value) -> Value {
    response["id"] = id;
    response
}

/// Write JSON-RPC responses, one per line, flushed immediately.
async fn write_responses<W: AsyncWrite + Unpin>(mut rx: mpsc::Receiver<Value>, mut out: W) {
    while let Some(response) = rx.recv().await {
        let mut output = serde_json::to_string(&response).unwrap_or_default();
        output.push('\n');
        if let Err(e) = out.write_all(output.as_bytes()).await {
            error!(error = %e, "stdout write error");
        }
        if let Err(e) = out.flush().await {
            error!(error = %e, "stdout flush error");
        }
    }
}
