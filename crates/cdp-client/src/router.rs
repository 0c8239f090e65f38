//! Notification dispatch.
//!
//! Notifications carry a method name and no correlation id. The router keeps
//! a per-session registry of handlers keyed by method name and invokes every
//! matching handler in registration order. Handlers are synchronous: the
//! dispatch loop is the single writer, so no two handlers ever run
//! concurrently against shared aggregator state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

/// A registered consumer of one notification method.
pub trait NotificationHandler: Send + Sync {
    fn on_notification(&self, method: &str, params: &Value);
}

impl<F> NotificationHandler for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn on_notification(&self, method: &str, params: &Value) {
        self(method, params)
    }
}

/// Per-session handler registry.
pub struct Router {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn NotificationHandler>>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, method: impl Into<String>, handler: Arc<dyn NotificationHandler>) {
        self.handlers
            .write()
            .entry(method.into())
            .or_default()
            .push(handler);
    }

    /// Dispatch one notification to every handler subscribed to its method.
    /// Unknown methods are ignored, keeping the session forward-compatible
    /// with protocol evolution.
    pub fn dispatch(&self, method: &str, params: &Value) {
        let matched: Vec<Arc<dyn NotificationHandler>> = {
            let handlers = self.handlers.read();
            match handlers.get(method) {
                Some(list) => list.clone(),
                None => {
                    trace!(target: "cdp-session", method, "unhandled notification");
                    return;
                }
            }
        };

        for handler in matched {
            handler.on_notification(method, params);
        }
    }

    /// Drop every registration. Called on session teardown.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
