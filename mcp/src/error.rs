//! Error taxonomy shared by the session manager and the tool facade.
//!
//! - [`ConfigError`]: credentials or settings missing/invalid in the environment
//! - [`ConnectionError`]: the shared backend session could not be created
//! - [`TeardownError`]: closing the shared session failed (logged, never fatal)
//!
//! Safety-filter rejections are not errors of the backend; they live in
//! [`guardrails::ValidationRejected`](crate::guardrails::ValidationRejected).

use thiserror::Error;

use crate::backend::BackendError;

/// Invalid or missing configuration read from the process environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} is empty")]
    Empty(&'static str),
    #[error("{var} is not valid base64: {source}")]
    InvalidBase64 {
        var: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("{0} does not decode to UTF-8 text")]
    InvalidUtf8(&'static str),
}

/// Failure to establish the shared backend session.
///
/// Never retried by the manager; the next `acquire()` starts from scratch.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid credentials configuration: {0}")]
    Credentials(#[from] ConfigError),
    #[error("failed to connect to RADKit: {0}")]
    Backend(#[from] BackendError),
    /// The blocking worker running the SDK call panicked or was cancelled.
    #[error("connection worker failed: {0}")]
    Worker(String),
}

/// Failure while closing the shared backend session.
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("error closing connection: {0}")]
    Backend(#[from] BackendError),
    #[error("teardown worker failed: {0}")]
    Worker(String),
}
