use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

/// Where a forwarding failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    RestApi,
    Telegram,
    General,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::RestApi => write!(f, "rest-api"),
            ErrorCategory::Telegram => write!(f, "telegram"),
            ErrorCategory::General => write!(f, "general"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub category: ErrorCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEvent {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives error events as they happen
pub trait ErrorListener: Send + Sync {
    fn on_error(&self, event: &ErrorEvent) -> Result<()>;
}

impl<F> ErrorListener for F
where
    F: Fn(&ErrorEvent) -> Result<()> + Send + Sync,
{
    fn on_error(&self, event: &ErrorEvent) -> Result<()> {
        self(event)
    }
}

/// Subscriber list for error events.
///
/// Listeners are identified by their `Arc` allocation, so unsubscribing
/// needs the same handle that was subscribed.
#[derive(Default)]
pub struct ErrorListeners {
    listeners: RwLock<Vec<Arc<dyn ErrorListener>>>,
}

impl ErrorListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn ErrorListener>) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Returns false when the listener was not subscribed
    pub fn unsubscribe(&self, listener: &Arc<dyn ErrorListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Deliver an event to every listener. A failing listener is logged and
    /// skipped.
    pub fn emit(&self, event: &ErrorEvent) {
        // Snapshot so a listener may (un)subscribe without deadlocking
        let listeners: Vec<Arc<dyn ErrorListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_error(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error listener failed: {:#}", e),
                Err(_) => error!("Error listener panicked while handling {}", event.category),
            }
        }
    }
}

fn same_listener(a: &Arc<dyn ErrorListener>, b: &Arc<dyn ErrorListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<dyn ErrorListener>, Arc<Mutex<Vec<ErrorCategory>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn ErrorListener> = Arc::new(move |e: &ErrorEvent| -> Result<()> {
            sink.lock().unwrap().push(e.category);
            Ok(())
        });
        (listener, seen)
    }

    #[test]
    fn test_category_tags() {
        assert_eq!(ErrorCategory::RestApi.to_string(), "rest-api");
        assert_eq!(ErrorCategory::Telegram.to_string(), "telegram");
        assert_eq!(
            serde_json::to_string(&ErrorCategory::General).unwrap(),
            r#""general""#
        );
    }

    #[test]
    fn test_emit_reaches_all_listeners() {
        let listeners = ErrorListeners::new();
        let (a, seen_a) = recorder();
        let (b, seen_b) = recorder();
        listeners.subscribe(a);
        listeners.subscribe(b);

        listeners.emit(&ErrorEvent::new(ErrorCategory::Telegram, "boom"));

        assert_eq!(*seen_a.lock().unwrap(), vec![ErrorCategory::Telegram]);
        assert_eq!(*seen_b.lock().unwrap(), vec![ErrorCategory::Telegram]);
    }

    #[test]
    fn test_unsubscribe_by_handle() {
        let listeners = ErrorListeners::new();
        let (a, seen) = recorder();
        listeners.subscribe(Arc::clone(&a));
        listeners.subscribe(Arc::clone(&a));
        assert_eq!(listeners.len(), 1);

        assert!(listeners.unsubscribe(&a));
        assert!(!listeners.unsubscribe(&a));
        listeners.emit(&ErrorEvent::new(ErrorCategory::General, "ignored"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_listeners_do_not_block_others() {
        let listeners = ErrorListeners::new();
        let failing: Arc<dyn ErrorListener> =
            Arc::new(|_: &ErrorEvent| -> Result<()> { anyhow::bail!("listener broke") });
        let panicking: Arc<dyn ErrorListener> =
            Arc::new(|_: &ErrorEvent| -> Result<()> { panic!("listener panicked") });
        let (ok, seen) = recorder();
        listeners.subscribe(failing);
        listeners.subscribe(panicking);
        listeners.subscribe(ok);

        listeners.emit(&ErrorEvent::new(ErrorCategory::RestApi, "boom"));

        assert_eq!(*seen.lock().unwrap(), vec![ErrorCategory::RestApi]);
    }
}
