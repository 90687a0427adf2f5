use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{error, info};

/// Why the pipeline is stopping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Operator asked for a stop (Ctrl-C, or the caller).
    Requested,
    /// A component hit an unrecoverable error.
    Fatal {
        component: &'static str,
        error: String,
    },
}

impl ShutdownCause {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("shutdown requested"),
            Self::Fatal { component, error } => write!(f, "{component} failed: {error}"),
        }
    }
}

struct Inner {
    tx: watch::Sender<bool>,
    cause: Mutex<Option<ShutdownCause>>,
}

/// Process-wide stop signal shared by the producer, the writer and the
/// supervisor. Once triggered it never resets.
///
/// A fatal cause replaces an earlier graceful one; the first fatal cause
/// is kept.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<Inner>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tx,
                cause: Mutex::new(None),
            }),
        }
    }

    /// Graceful stop: components finish their current unit of work.
    pub fn request(&self) {
        let first = self.set_cause(ShutdownCause::Requested);
        if first {
            info!("shutdown requested");
        }
        self.trigger();
    }

    /// Fatal stop raised by `component`.
    pub fn force(&self, component: &'static str, err: impl fmt::Display) {
        let error = err.to_string();
        error!(component, %error, "fatal error, shutting down");
        self.set_cause(ShutdownCause::Fatal { component, error });
        self.trigger();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.tx.borrow()
    }

    pub fn is_fatal(&self) -> bool {
        self.cause().is_some_and(|c| c.is_fatal())
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        self.lock_cause().clone()
    }

    /// Resolves once the handle is triggered.
    pub async fn triggered(&self) {
        let mut rx = self.inner.tx.subscribe();
        // The sender lives in `self`, so this only ends on `true`.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    fn trigger(&self) {
        self.inner.tx.send_replace(true);
    }

    /// Returns true when this call set the first cause.
    fn set_cause(&self, cause: ShutdownCause) -> bool {
        let mut slot = self.lock_cause();
        match (&*slot, &cause) {
            (None, _) => {
                *slot = Some(cause);
                true
            }
            (Some(ShutdownCause::Requested), ShutdownCause::Fatal { .. }) => {
                *slot = Some(cause);
                false
            }
            _ => false,
        }
    }

    fn lock_cause(&self) -> std::sync::MutexGuard<'_, Option<ShutdownCause>> {
        // A poisoned lock still holds a valid Option.
        self.inner
            .cause
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("triggered", &self.is_triggered())
            .field("cause", &self.cause())
            .finish()
    }
}
