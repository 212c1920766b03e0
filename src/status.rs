//! Status reporting channel.
//!
//! All failures inside the editing core are caught at the component that
//! issued them and converted into a [`Status`]; nothing propagates far
//! enough to tear down the session. Success statuses are transient (they
//! carry a TTL so the UI can auto-clear them); errors stay visible until
//! replaced.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{error, info};

/// How long a transient status stays visible.
pub const TRANSIENT_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// A user-facing status message.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub level: StatusLevel,
    pub text: String,
    /// `Some` for transient messages the UI should auto-clear.
    pub ttl: Option<Duration>,
}

impl Status {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
            ttl: Some(TRANSIENT_TTL),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            text: text.into(),
            ttl: Some(TRANSIENT_TTL),
        }
    }

    /// Errors persist until dismissed or replaced.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
            ttl: None,
        }
    }
}

/// Sink for status messages, injected into the engine and the persistence
/// coordinator.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: Status);
}

/// Routes statuses to the `log` facade.
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&self, status: Status) {
        match status.level {
            StatusLevel::Error => error!("{}", status.text),
            _ => info!("{}", status.text),
        }
    }
}

/// Retains the latest status for polling embedders and tests.
#[derive(Default)]
pub struct MemoryReporter {
    last: Mutex<Option<(Status, Instant)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest status, unless it was transient and has expired.
    pub fn current(&self) -> Option<Status> {
        let guard = self.last.lock().ok()?;
        let (status, at) = guard.as_ref()?;
        match status.ttl {
            Some(ttl) if at.elapsed() > ttl => None,
            _ => Some(status.clone()),
        }
    }

    /// The latest status regardless of TTL.
    pub fn latest(&self) -> Option<Status> {
        self.last.lock().ok()?.as_ref().map(|(s, _)| s.clone())
    }
}

impl StatusReporter for MemoryReporter {
    fn report(&self, status: Status) {
        if let Ok(mut guard) = self.last.lock() {
            *guard = Some((status, Instant::now()));
        }
    }
}
