//! Configuration loading for radkit-mcp.
//!
//! Two kinds of settings exist:
//!
//! 1. **Server settings**: transport, listen address, gateway URL, readiness
//!    timeout, log level. Parsed once at startup by [`Cli`]; each flag falls
//!    back to an environment variable.
//! 2. **Credentials**: username, service code and the optional key password.
//!    Read by [`Credentials::from_env`] every time the shared session is
//!    (re)created and never cached, so rotating them only requires a
//!    reconnect.
//!
//! A `.env` file in the working directory is loaded before either is read
//! (variables already set in the process environment win).

use std::time::Duration;

use base64::Engine as _;
use clap::{Parser, ValueEnum};

use crate::error::ConfigError;

pub const USERNAME_VAR: &str = "RADKIT_SERVICE_USERNAME";
pub const SERVICE_CODE_VAR: &str = "RADKIT_SERVICE_CODE";
pub const KEY_PASSWORD_VAR: &str = "RADKIT_CLIENT_PRIVATE_KEY_PASSWORD_BASE64";

/// CLI arguments parsed by `clap`.
#[derive(Parser, Debug)]
#[command(
    name = "radkit-mcp",
    version,
    about = "MCP server for devices reachable through a RADKit service"
)]
pub struct Cli {
    /// MCP transport to serve on.
    #[arg(long, env = "MCP_TRANSPORT", value_enum, ignore_case = true, default_value = "stdio")]
    pub transport: Transport,

    /// Listen host for the HTTP transport.
    #[arg(long, env = "MCP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port for the HTTP transport.
    #[arg(long, env = "MCP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Base URL of the device-access gateway.
    #[arg(long, env = "RADKIT_GATEWAY_URL")]
    pub gateway_url: String,

    /// Give up waiting for the service to become ready after this many
    /// seconds. Waits indefinitely when unset.
    #[arg(long, env = "RADKIT_SERVICE_READY_TIMEOUT_SECS")]
    pub ready_timeout_secs: Option<u64>,

    /// Default log filter, overridden by `RUST_LOG`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
    /// Accepted for compatibility; served by the HTTP transport.
    Sse,
}

/// Identity used to authenticate against the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub service_code: String,
    /// Decoded private-key password, when non-interactive login is configured.
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("service_code", &self.service_code)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            let value = lookup(var).ok_or(ConfigError::Missing(var))?;
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(var));
            }
            Ok(value)
        };

        let username = required(USERNAME_VAR)?;
        let service_code = required(SERVICE_CODE_VAR)?;

        let password = match lookup(KEY_PASSWORD_VAR) {
            Some(encoded) if !encoded.trim().is_empty() => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|source| ConfigError::InvalidBase64 {
                        var: KEY_PASSWORD_VAR,
                        source,
                    })?;
                Some(String::from_utf8(bytes).map_err(|_| ConfigError::InvalidUtf8(KEY_PASSWORD_VAR))?)
            }
            _ => None,
        };

        Ok(Self {
            username,
            service_code,
            password,
        })
    }
}

/// The error from loading a `.env` file worth reporting. A missing file is
/// not one.
pub fn dotenv_problem<T>(loaded: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    loaded.err().filter(|e| !e.not_found())
}
