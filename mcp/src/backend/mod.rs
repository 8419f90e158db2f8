//! Boundary to the device-access backend.
//!
//! The backend is reached through a synchronous SDK: every method here may
//! block for network round-trips and must therefore only be called from a
//! `tokio::task::spawn_blocking` worker, never from the async scheduler.
//!
//! A session is built in three steps: [`Backend::open`] a client context,
//! [`Backend::login`] with the configured identity, then resolve the named
//! service with [`Backend::service`] (which waits until the service is ready).
//! The resulting [`Service`] is the handle the tools operate on.

#[cfg(test)]
pub(crate) mod fake;
pub mod gateway;

use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Credentials;

/// Opaque, blocking device-access SDK.
pub trait Backend: Send + Sync + 'static {
    /// Client context; owned exclusively by the session manager.
    type Context: Send + 'static;
    /// Authenticated client, only used to resolve the service.
    type Client: Send;
    /// Live service handle shared with callers.
    type Service: Service;

    fn open(&self) -> Result<Self::Context, BackendError>;

    fn login(
        &self,
        context: &mut Self::Context,
        credentials: &Credentials,
    ) -> Result<Self::Client, BackendError>;

    /// Resolve `service_code` and block until it is ready. `None` waits
    /// without bound.
    fn service(
        &self,
        client: &Self::Client,
        service_code: &str,
        ready_timeout: Option<Duration>,
    ) -> Result<Self::Service, BackendError>;

    fn close(&self, context: Self::Context) -> Result<(), BackendError>;
}

/// Operations available on a connected service.
pub trait Service: Send + Sync + 'static {
    /// Names of the devices onboarded in the service inventory.
    fn inventory(&self) -> Result<Vec<String>, BackendError>;

    /// Internal attributes of one inventory device.
    fn attributes(&self, device: &str) -> Result<Map<String, Value>, BackendError>;

    /// Run a batch of CLI commands on one device, preserving order.
    fn exec(&self, device: &str, commands: &[String]) -> Result<Vec<CommandOutput>, BackendError>;
}

/// Raw output of one executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub data: String,
}

/// Errors raised across the SDK boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network-level failure (connection refused, timeout, DNS failure, etc.).
    #[error("request failed: {0}")]
    Transport(String),
    /// The backend answered with a non-success status. "Access denied" here
    /// usually means RBAC lacks a tag for the device.
    #[error("backend error (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service '{service}' is unavailable: {status}")]
    ServiceUnavailable { service: String, status: String },
    #[error("service '{service}' not ready after {waited:?}")]
    ReadyTimeout { service: String, waited: Duration },
    #[error("command '{command}' failed on {device}: {message}")]
    Command {
        device: String,
        command: String,
        message: String,
    },
}
