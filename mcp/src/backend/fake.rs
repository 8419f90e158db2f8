//! In-memory backend for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use super::{Backend, BackendError, CommandOutput, Service};
use crate::config::Credentials;

/// Counters and switches shared between a [`FakeBackend`] and the test.
#[derive(Debug, Default)]
pub struct FakeStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub execs: AtomicUsize,
    /// Upcoming logins to fail.
    pub failing_logins: AtomicUsize,
    pub failing_close: AtomicBool,
}

impl FakeStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub stats: Arc<FakeStats>,
    /// Blocking delay inside `open`, to widen race windows.
    pub open_delay: Duration,
    /// Blocking delay inside every `exec`.
    pub exec_delay: Duration,
}

impl FakeBackend {
    pub fn new() -> (Self, Arc<FakeStats>) {
        let backend = Self::default();
        let stats = Arc::clone(&backend.stats);
        (backend, stats)
    }

    pub fn slow(open_delay: Duration) -> (Self, Arc<FakeStats>) {
        let (mut backend, stats) = Self::new();
        backend.open_delay = open_delay;
        (backend, stats)
    }
}

#[derive(Debug)]
pub struct FakeService {
    pub generation: usize,
    exec_delay: Duration,
    stats: Arc<FakeStats>,
}

impl Backend for FakeBackend {
    type Context = usize;
    type Client = usize;
    type Service = FakeService;

    fn open(&self) -> Result<usize, BackendError> {
        std::thread::sleep(self.open_delay);
        Ok(self.stats.opens.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn login(&self, context: &mut usize, credentials: &Credentials) -> Result<usize, BackendError> {
        let failing = self
            .stats
            .failing_logins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing || credentials.username.is_empty() {
            return Err(BackendError::Rejected {
                status: 401,
                message: "certificate login failed".into(),
            });
        }
        Ok(*context)
    }

    fn service(
        &self,
        client: &usize,
        _service_code: &str,
        _ready_timeout: Option<Duration>,
    ) -> Result<FakeService, BackendError> {
        Ok(FakeService {
            generation: *client,
            exec_delay: self.exec_delay,
            stats: Arc::clone(&self.stats),
        })
    }

    fn close(&self, _context: usize) -> Result<(), BackendError> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        if self.stats.failing_close.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("socket already closed".into()));
        }
        Ok(())
    }
}

impl Service for FakeService {
    fn inventory(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec!["p1-2e".into(), "p0-2e".into()])
    }

    fn attributes(&self, device: &str) -> Result<Map<String, Value>, BackendError> {
        match device {
            "p0-2e" => match json!({ "host": "10.48.172.59", "device_type": "IOS_XE" }) {
                Value::Object(map) => Ok(map),
                _ => unreachable!(),
            },
            other => Err(BackendError::NotFound(format!("device '{other}' not in inventory"))),
        }
    }

    fn exec(&self, device: &str, commands: &[String]) -> Result<Vec<CommandOutput>, BackendError> {
        std::thread::sleep(self.exec_delay);
        self.stats.execs.fetch_add(1, Ordering::SeqCst);
        Ok(commands
            .iter()
            .map(|c| CommandOutput {
                command: c.clone(),
                data: format!("{device}#{c}\nok"),
            })
            .collect())
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "alice".into(),
        service_code: "svc".into(),
        password: None,
    }
}
