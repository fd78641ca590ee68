use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::message::InboundMessage;

/// The (queue name, routing key) pair a handler is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueBinding {
    /// Physical queue the handler consumes from
    pub name: String,
    /// Routing key the queue is bound under
    pub routing_key: String,
    /// Always false for this system
    pub durable: bool,
}

/// Boxed future returned by a message callback
pub type CallbackFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Callback invoked once per inbound delivery: `(body, message)`
pub type MessageCallback =
    Arc<dyn Fn(Value, Arc<InboundMessage>) -> CallbackFuture + Send + Sync>;

/// Per-instance registration state: handler name to queue bindings and to
/// installed message callbacks.
///
/// Populated while handlers register, read once consumption starts, never
/// pruned. Each [`Registrator`](crate::Registrator) owns its own registry,
/// so independent instances cannot collide on shared maps.
#[derive(Default)]
pub struct Registry {
    bindings: RwLock<HashMap<String, Vec<QueueBinding>>>,
    callbacks: RwLock<HashMap<String, Vec<MessageCallback>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one registration. Re-registering a name appends rather than
    /// replaces: the binding and callback lists accumulate.
    pub async fn insert(&self, name: &str, binding: QueueBinding, callback: MessageCallback) {
        self.bindings
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .push(binding);
        self.callbacks
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .push(callback);
    }

    /// Queue bindings registered under `name`
    pub async fn bindings(&self, name: &str) -> Option<Vec<QueueBinding>> {
        self.bindings.read().await.get(name).cloned()
    }

    /// Message callbacks installed under `name`
    pub async fn callbacks(&self, name: &str) -> Option<Vec<MessageCallback>> {
        self.callbacks.read().await.get(name).cloned()
    }

    /// Whether `name` has at least one registration
    pub async fn contains(&self, name: &str) -> bool {
        self.bindings.read().await.contains_key(name)
    }

    /// All registered handler names
    pub async fn handler_names(&self) -> Vec<String> {
        self.bindings.read().await.keys().cloned().collect()
    }

    /// Snapshot of every registration, bindings zipped with their
    /// callbacks in registration order.
    pub async fn snapshot(&self) -> Vec<(String, Vec<QueueBinding>, Vec<MessageCallback>)> {
        let bindings = self.bindings.read().await;
        let callbacks = self.callbacks.read().await;
        bindings
            .iter()
            .map(|(name, queue_bindings)| {
                (
                    name.clone(),
                    queue_bindings.clone(),
                    callbacks.get(name).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish()
    }
}
