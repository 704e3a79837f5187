//! Event dispatcher.
//!
//! Maps push channel event names to handlers. The connection manager emits into it,
//! consumers (the sync coordinator, UI code) subscribe to it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

/// A registered event handler. Identity is the `Arc` allocation.
pub type Handler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Wrap a closure into a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&serde_json::Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An `(event, handler)` pair returned by [`EventDispatcher::on`].
#[derive(Clone)]
pub struct Subscription {
    event: String,
    handler: Handler,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `event`. Handlers run in registration order.
    pub fn on(&self, event: impl Into<String>, handler: Handler) -> Subscription {
        let event = event.into();
        let mut handlers = self.handlers.lock().unwrap();
        handlers
            .entry(event.clone())
            .or_default()
            .push(handler.clone());
        Subscription { event, handler }
    }

    /// Remove this exact handler from `event`. Unknown handlers are ignored.
    pub fn off(&self, event: &str, handler: &Handler) {
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(list) = handlers.get_mut(event) {
            if let Some(index) = list.iter().position(|h| Arc::ptr_eq(h, handler)) {
                list.remove(index);
            }
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.off(&subscription.event, &subscription.handler);
    }

    /// Invoke every handler registered for `event` at the time of the call.
    ///
    /// A panicking handler is logged and skipped; the rest still run.
    /// Returns the number of handlers that completed.
    pub fn emit(&self, event: &str, payload: &serde_json::Value) -> usize {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap();
            match handlers.get(event) {
                Some(list) => list.clone(),
                None => {
                    debug!("No handlers for event {}", event);
                    return 0;
                }
            }
        };

        let mut completed = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("Handler for event {} panicked: {}", event, reason);
                }
            }
        }
        completed
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .unwrap()
            .get(event)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub fn total_handlers(&self) -> usize {
        self.handlers.lock().unwrap().values().map(|l| l.len()).sum()
    }
}
