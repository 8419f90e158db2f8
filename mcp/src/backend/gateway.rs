//! HTTP device-access gateway backend.
//!
//! [`GatewayBackend`] implements the blocking [`Backend`] contract on top of
//! an async `reqwest::Client`. Each call drives its request to completion with
//! [`Handle::block_on`], which is only legal outside the async scheduler, so
//! callers must run these methods inside `spawn_blocking` (the session manager
//! and the tool handlers do).
//!
//! ## Endpoints
//!
//! | Method | Path                                         | Purpose                 |
//! |--------|----------------------------------------------|-------------------------|
//! | POST   | `/api/v1/login`                              | authenticate, get token |
//! | POST   | `/api/v1/logout`                             | end the client context  |
//! | GET    | `/api/v1/services/{code}`                    | service readiness       |
//! | GET    | `/api/v1/services/{code}/inventory`          | device names            |
//! | GET    | `/api/v1/services/{code}/inventory/{device}` | device attributes       |
//! | POST   | `/api/v1/services/{code}/inventory/{device}/exec` | run CLI commands   |
//!
//! Everything but `login` uses Bearer token authentication. Non-2xx responses
//! are parsed for an `error` field in the JSON body; if that fails the raw body
//! becomes the error message.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::runtime::Handle;

use super::{Backend, BackendError, CommandOutput, Service};
use crate::config::Credentials;

/// Interval between readiness polls while waiting for a service.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Backend talking to a device-access gateway over HTTP.
pub struct GatewayBackend {
    base_url: String,
    runtime: Handle,
}

impl GatewayBackend {
    /// Create a backend for the gateway at `base_url`. `runtime` must be a
    /// handle to the multi-thread runtime whose blocking pool will run the calls.
    pub fn new(base_url: String, runtime: Handle) -> Self {
        // Strip trailing slash for consistent URL construction
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url, runtime }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Open client context. Holds the login token once authenticated so the
/// context can log out on close.
pub struct GatewayContext {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Authenticated client, used only to resolve a service.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

/// Connected service handle.
pub struct GatewayService {
    http: reqwest::Client,
    base_url: String,
    token: String,
    service_code: String,
    runtime: Handle,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct ServiceStatus {
    status: String,
}

#[derive(Deserialize)]
struct InventoryResponse {
    devices: Vec<InventoryDevice>,
}

#[derive(Deserialize)]
struct InventoryDevice {
    name: String,
}

#[derive(Deserialize)]
struct AttributesResponse {
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Deserialize)]
struct ExecResponse {
    results: Vec<ExecResult>,
}

#[derive(Deserialize)]
struct ExecResult {
    command: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: String,
}

impl Backend for GatewayBackend {
    type Context = GatewayContext;
    type Client = GatewayClient;
    type Service = GatewayService;

    fn open(&self) -> Result<GatewayContext, BackendError> {
        let mut default_headers = reqwest::header::HeaderMap::new();
        default_headers.insert(
            reqwest::header::HeaderName::from_static("x-radkit-client"),
            reqwest::header::HeaderValue::from_static("mcp"),
        );
        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(GatewayContext {
            http,
            base_url: self.base_url.clone(),
            token: None,
        })
    }

    fn login(
        &self,
        context: &mut GatewayContext,
        credentials: &Credentials,
    ) -> Result<GatewayClient, BackendError> {
        let mut body = json!({ "username": credentials.username });
        if let Some(password) = &credentials.password {
            body["password"] = json!(password);
        }
        let url = endpoint(&context.base_url, &["api", "v1", "login"])?;
        let request = context.http.post(url).json(&body);
        let value = self.runtime.block_on(send(request))?;
        let login: LoginResponse = decode(value)?;

        context.token = Some(login.token.clone());
        Ok(GatewayClient {
            http: context.http.clone(),
            base_url: context.base_url.clone(),
            token: login.token,
        })
    }

    fn service(
        &self,
        client: &GatewayClient,
        service_code: &str,
        ready_timeout: Option<Duration>,
    ) -> Result<GatewayService, BackendError> {
        let url = endpoint(&client.base_url, &["api", "v1", "services", service_code])?;
        let started = Instant::now();

        loop {
            let request = client.http.get(url.clone()).bearer_auth(&client.token);
            let status: ServiceStatus = decode(self.runtime.block_on(send(request))?)?;

            match status.status.to_ascii_lowercase().as_str() {
                "ready" => break,
                "unreachable" | "error" => {
                    return Err(BackendError::ServiceUnavailable {
                        service: service_code.to_string(),
                        status: status.status,
                    })
                }
                _ => {}
            }

            let mut pause = READY_POLL_INTERVAL;
            if let Some(limit) = ready_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    return Err(BackendError::ReadyTimeout {
                        service: service_code.to_string(),
                        waited,
                    });
                }
                pause = pause.min(limit - waited);
            }
            std::thread::sleep(pause);
        }

        Ok(GatewayService {
            http: client.http.clone(),
            base_url: client.base_url.clone(),
            token: client.token.clone(),
            service_code: service_code.to_string(),
            runtime: self.runtime.clone(),
        })
    }

    fn close(&self, context: GatewayContext) -> Result<(), BackendError> {
        let Some(token) = context.token else {
            return Ok(());
        };
        let url = endpoint(&context.base_url, &["api", "v1", "logout"])?;
        let request = context.http.post(url).bearer_auth(token);
        self.runtime.block_on(send(request)).map(|_| ())
    }
}

impl GatewayService {
    fn inventory_url(&self, rest: &[&str]) -> Result<reqwest::Url, BackendError> {
        let mut segments = vec!["api", "v1", "services", self.service_code.as_str(), "inventory"];
        segments.extend_from_slice(rest);
        endpoint(&self.base_url, &segments)
    }
}

impl Service for GatewayService {
    fn inventory(&self) -> Result<Vec<String>, BackendError> {
        let request = self.http.get(self.inventory_url(&[])?).bearer_auth(&self.token);
        let inventory: InventoryResponse = decode(self.runtime.block_on(send(request))?)?;
        Ok(inventory.devices.into_iter().map(|d| d.name).collect())
    }

    fn attributes(&self, device: &str) -> Result<Map<String, Value>, BackendError> {
        let request = self
            .http
            .get(self.inventory_url(&[device])?)
            .bearer_auth(&self.token);
        let response: AttributesResponse = decode(self.runtime.block_on(send(request))?)?;
        Ok(response.attributes)
    }

    fn exec(&self, device: &str, commands: &[String]) -> Result<Vec<CommandOutput>, BackendError> {
        let request = self
            .http
            .post(self.inventory_url(&[device, "exec"])?)
            .bearer_auth(&self.token)
            .json(&json!({ "commands": commands }));
        let response: ExecResponse = decode(self.runtime.block_on(send(request))?)?;

        response
            .results
            .into_iter()
            .map(|r| match r.status.as_deref() {
                Some(s) if s.eq_ignore_ascii_case("failure") => Err(BackendError::Command {
                    device: device.to_string(),
                    command: r.command,
                    message: r.data,
                }),
                _ => Ok(CommandOutput {
                    command: r.command,
                    data: r.data,
                }),
            })
            .collect()
    }
}

/// Build `<base_url>/<segments...>` with each segment percent-encoded.
fn endpoint(base_url: &str, segments: &[&str]) -> Result<reqwest::Url, BackendError> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| BackendError::Protocol(format!("invalid gateway URL '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|()| BackendError::Protocol(format!("gateway URL '{base_url}' cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Send a request and parse its response: the JSON body on success, or a
/// [`BackendError`] carrying the error message on failure.
async fn send(request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
    let resp = request
        .send()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;

    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| BackendError::Protocol(format!("invalid JSON from gateway: {e}")))
    } else {
        // Try to extract error message from JSON body
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["error"].as_str().map(String::from))
            .unwrap_or(body);
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(BackendError::NotFound(message))
        } else {
            Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value)
        .map_err(|e| BackendError::Protocol(format!("unexpected gateway response: {e}")))
}
