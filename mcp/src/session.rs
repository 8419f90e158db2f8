//! Shared backend session.
//!
//! [`SessionManager`] holds at most one live backend session for the whole
//! process. It is created lazily by the first [`acquire`](SessionManager::acquire)
//! and reused by every later tool call until [`release`](SessionManager::release).
//!
//! ## Locking
//!
//! A single `tokio::sync::Mutex` covers both the existence check and the
//! whole creation sequence, so creation attempts are serialized and nobody
//! observes a half-built session. Callers that queue up behind a creation see
//! its outcome: the new session, or an empty slot they then try to fill
//! themselves.
//!
//! The SDK calls themselves run on the blocking pool (`spawn_blocking`); only
//! the lock holder waits for them, other tasks keep running.
//!
//! A readiness wait that never finishes holds the lock and therefore stalls
//! every acquirer. Set a ready timeout to bound it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::backend::{Backend, BackendError};
use crate::config::Credentials;
use crate::error::{ConfigError, ConnectionError, TeardownError};

/// Source of credentials, consulted on every session creation.
pub type CredentialLoader = Arc<dyn Fn() -> Result<Credentials, ConfigError> + Send + Sync>;

/// The live session: context (owned here only) plus the service handle
/// handed out to callers.
struct Shared<B: Backend> {
    context: B::Context,
    service: Arc<B::Service>,
}

/// Owner of the process-wide backend session.
pub struct SessionManager<B: Backend> {
    backend: Arc<B>,
    credentials: CredentialLoader,
    ready_timeout: Option<Duration>,
    shared: Arc<Mutex<Option<Shared<B>>>>,
}

impl<B: Backend> SessionManager<B> {
    /// Manager reading credentials from the process environment.
    pub fn new(backend: B, ready_timeout: Option<Duration>) -> Self {
        Self::with_credentials(backend, ready_timeout, Credentials::from_env)
    }

    pub fn with_credentials(
        backend: B,
        ready_timeout: Option<Duration>,
        credentials: impl Fn() -> Result<Credentials, ConfigError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            credentials: Arc::new(credentials),
            ready_timeout,
            shared: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the shared service handle, creating the session if needed.
    ///
    /// On failure nothing is stored, so the next call starts over. Creation
    /// runs on its own task together with the lock, so a session finished
    /// after the caller went away is still stored for the next one.
    pub async fn acquire(&self) -> Result<Arc<B::Service>, ConnectionError> {
        let mut shared = Arc::clone(&self.shared).lock_owned().await;
        if let Some(existing) = shared.as_ref() {
            return Ok(Arc::clone(&existing.service));
        }

        let credentials = (self.credentials)().inspect_err(|e| {
            error!(error = %e, "Failed to create RADKit connection");
        })?;
        info!(
            username = %credentials.username,
            service = %credentials.service_code,
            "Creating RADKit connection"
        );

        let backend = Arc::clone(&self.backend);
        let ready_timeout = self.ready_timeout;
        let creation = tokio::spawn(async move {
            let created = tokio::task::spawn_blocking(move || {
                connect(&*backend, &credentials, ready_timeout)
            })
            .await;

            match created {
                Ok(Ok((context, service))) => {
                    let service = Arc::new(service);
                    *shared = Some(Shared {
                        context,
                        service: Arc::clone(&service),
                    });
                    info!("RADKit connection established");
                    Ok(service)
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Failed to create RADKit connection");
                    Err(ConnectionError::Backend(e))
                }
                Err(e) => {
                    error!(error = %e, "RADKit connection worker failed");
                    Err(ConnectionError::Worker(e.to_string()))
                }
            }
        });

        creation
            .await
            .unwrap_or_else(|e| Err(ConnectionError::Worker(e.to_string())))
    }

    /// Close the shared session, if any. Idempotent.
    ///
    /// The slot is emptied before the backend is asked to close, so a close
    /// failure is only logged and the next [`acquire`](Self::acquire) builds a
    /// fresh session.
    pub async fn release(&self) {
        let mut shared = self.shared.lock().await;
        let Some(Shared { context, service }) = shared.take() else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let closed = tokio::task::spawn_blocking(move || {
            let result = backend.close(context);
            // Our reference to the handle goes away on the worker, with its context.
            drop(service);
            result
        })
        .await;

        let result = match closed {
            Ok(r) => r.map_err(TeardownError::from),
            Err(e) => Err(TeardownError::Worker(e.to_string())),
        };
        match result {
            Ok(()) => info!("RADKit connection closed"),
            Err(e) => warn!(error = %e, "RADKit connection teardown failed; state reset"),
        }
    }

    /// Whether a session is live. Reports `false` while the lock is held
    /// (creation, release) instead of waiting for it.
    pub fn is_connected(&self) -> bool {
        self.shared
            .try_lock()
            .map(|shared| shared.is_some())
            .unwrap_or(false)
    }
}

/// The three-step creation sequence. Runs on a blocking worker.
///
/// A context opened before a failed login or service lookup is closed again
/// before the error is returned.
fn connect<B: Backend>(
    backend: &B,
    credentials: &Credentials,
    ready_timeout: Option<Duration>,
) -> Result<(B::Context, B::Service), BackendError> {
    let mut context = backend.open()?;
    let resolved = backend
        .login(&mut context, credentials)
        .and_then(|client| backend.service(&client, &credentials.service_code, ready_timeout));

    match resolved {
        Ok(service) => Ok((context, service)),
        Err(e) => {
            if let Err(close_err) = backend.close(context) {
                warn!(error = %close_err, "Failed to close client context after connection error");
            }
            Err(e)
        }
    }
}
