//! HTTP transport.
//!
//! | Method | Path      | Description                                        |
//! |--------|-----------|----------------------------------------------------|
//! | POST   | `/mcp`    | One JSON-RPC message in, one response out          |
//! | GET    | `/health` | Liveness probe with backend connection state       |
//!
//! Notifications posted to `/mcp` are answered with `202 Accepted` and no
//! body. Requests are served concurrently; they share the one backend session.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::backend::Backend;
use crate::mcp;
use crate::session::SessionManager;

/// Build the router for the HTTP transport.
pub fn router<B: Backend>(sessions: Arc<SessionManager<B>>) -> Router {
    Router::new()
        .route("/mcp", post(mcp_post::<B>))
        .route("/health", get(health::<B>))
        .with_state(sessions)
}

/// Serve until `shutdown` resolves.
pub async fn serve<B: Backend>(
    listen: &str,
    sessions: Arc<SessionManager<B>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(listen, "Serving MCP over HTTP at /mcp");
    axum::serve(listener, router(sessions))
        .with_graceful_shutdown(shutdown)
        .await
}

/// `POST /mcp`: answer one JSON-RPC message.
async fn mcp_post<B: Backend>(
    State(sessions): State<Arc<SessionManager<B>>>,
    body: String,
) -> Response {
    let request: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(mcp::parse_error(&e))).into_response(),
    };

    match mcp::handle_message(request, &sessions).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// `GET /health`: liveness probe.
async fn health<B: Backend>(State(sessions): State<Arc<SessionManager<B>>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend_connected": sessions.is_connected(),
    }))
}
