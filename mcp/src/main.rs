//! # radkit-mcp
//!
//! MCP (Model Context Protocol) server exposing devices reachable through a
//! RADKit device-access service: inventory listing, attribute lookup and CLI
//! command execution. Runs as a stdio JSON-RPC server by default (launched by
//! an AI agent host) or over HTTP.
//!
//! All tool calls share one authenticated backend session, created on first
//! use. CLI commands pass a safety filter before they can reach a device.
//!
//! ## Architecture
//!
//! ```text
//! main.rs           : entry point, config loading, tracing, transport launch
//! config.rs         : CLI flags / env vars, credential loading
//! error.rs          : connection, teardown and configuration errors
//! guardrails.rs     : command safety filter (deny rules + `no` heuristic)
//! session.rs        : shared backend session (lazy create, serialized)
//! backend/
//!   mod.rs          : blocking SDK boundary traits
//!   gateway.rs      : HTTP device-access gateway backend
//! tools.rs          : tool definitions and handlers
//! mcp.rs            : JSON-RPC dispatch, stdio transport
//! http.rs           : HTTP transport (axum)
//! ```

mod backend;
mod config;
mod error;
mod guardrails;
mod http;
mod mcp;
mod session;
mod tools;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backend::gateway::GatewayBackend;
use config::{Cli, Transport};
use session::SessionManager;

#[tokio::main]
async fn main() {
    // Variables already present in the environment take precedence.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries protocol traffic; logs go to stderr
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter))
        .with_writer(std::io::stderr)
        .init();

    if let Some(e) = config::dotenv_problem(dotenv) {
        warn!(error = %e, "Failed to load .env file");
    }

    let backend = GatewayBackend::new(cli.gateway_url.clone(), tokio::runtime::Handle::current());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        user = %std::env::var(config::USERNAME_VAR).unwrap_or_default(),
        service = %std::env::var(config::SERVICE_CODE_VAR).unwrap_or_default(),
        gateway = %backend.base_url(),
        "CiscoU RADKit MCP server starting"
    );

    let sessions = Arc::new(SessionManager::new(backend, cli.ready_timeout()));

    match cli.transport {
        Transport::Stdio => {
            tokio::select! {
                () = mcp::run_stdio(Arc::clone(&sessions)) => {}
                () = shutdown_signal() => {}
            }
        }
        Transport::Http | Transport::Sse => {
            let listen = cli.listen_addr();
            if let Err(e) = http::serve(&listen, Arc::clone(&sessions), shutdown_signal()).await {
                error!(error = %e, listen = %listen, "HTTP transport failed");
                sessions.release().await;
                std::process::exit(1);
            }
        }
    }

    info!("Shutting down...");
    sessions.release().await;
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to register SIGTERM");
                    ctrl_c.await;
                    info!("Received SIGINT");
                    return;
                }
            };
        tokio::select! {
            () = ctrl_c => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("Received SIGINT");
    }
}
