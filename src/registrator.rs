use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DispatchError, Result};
use crate::handler::{FunctionHandler, Handler};
use crate::registry::{MessageCallback, QueueBinding, Registry};
use crate::reply::ReplySender;
use crate::router::MessageRouter;
use crate::transport::Transport;

/// How a registered handler is invoked once a message arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeStyle {
    /// Fire-and-forget: invoke the handler, acknowledge, send nothing back
    Task,
    /// Request/response: invoke the handler, reply with its return value,
    /// acknowledge
    Rpc,
}

impl fmt::Display for InvokeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Rpc => write!(f, "rpc"),
        }
    }
}

/// Queue-routing strategy, fixed for the lifetime of a [`Registrator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Many commands multiplexed onto one shared queue, told apart by the
    /// envelope's `command` field
    Legacy,
    /// One queue per handler, named after the handler unless overridden
    Direct,
}

/// Where registrations put their consumption queue
enum QueuePolicy {
    /// Legacy: every handler consumes the one shared queue
    SharedQueue(String),
    /// Direct: `<prefix>.<handler>` unless the caller overrides the name
    PerHandler(String),
}

/// Constructor options for [`Registrator`]
#[derive(Debug, Clone)]
pub struct RegistratorConfig {
    /// Multiplex all handlers onto one shared queue
    pub legacy: bool,
    /// The shared queue name, required when `legacy` is set
    pub queue: Option<String>,
    /// Prefix for direct-mode queue names
    pub prefix: String,
    /// Exchange the queues bind to; empty means the default exchange
    pub exchange: String,
}

impl Default for RegistratorConfig {
    fn default() -> Self {
        Self {
            legacy: false,
            queue: None,
            prefix: "switchboard".to_string(),
            exchange: String::new(),
        }
    }
}

impl RegistratorConfig {
    /// Config for a legacy registrator multiplexing on `queue`
    pub fn legacy(queue: impl Into<String>) -> Self {
        Self {
            legacy: true,
            queue: Some(queue.into()),
            ..Self::default()
        }
    }

    /// Config for a direct registrator naming queues `<prefix>.<handler>`
    pub fn direct(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }
}

/// Registers named handlers against queues and owns the state consumption
/// reads: the per-name registry, and in legacy mode the dispatch table
/// behind the [`MessageRouter`].
///
/// Registration is expected to complete before consumption begins.
pub struct Registrator {
    policy: QueuePolicy,
    exchange: String,
    transport: Arc<dyn Transport>,
    registry: Registry,
    router: Arc<MessageRouter>,
    replies: ReplySender,
}

impl Registrator {
    /// Create a registrator. Legacy mode has no implicit naming fallback,
    /// so it fails with a configuration error unless `config.queue` names
    /// the shared queue all handlers will agree on.
    pub fn new(config: RegistratorConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let shared_queue = config.queue.filter(|q| !q.is_empty());
        let policy = if config.legacy {
            match shared_queue {
                Some(queue) => QueuePolicy::SharedQueue(queue),
                None => {
                    return Err(DispatchError::Config(
                        "'queue' is required for legacy dispatch".to_string(),
                    ))
                }
            }
        } else {
            QueuePolicy::PerHandler(config.prefix)
        };

        let replies = ReplySender::new(Arc::clone(&transport), config.exchange.clone());
        Ok(Self {
            policy,
            exchange: config.exchange,
            transport,
            registry: Registry::new(),
            router: Arc::new(MessageRouter::new(replies.clone())),
            replies,
        })
    }

    /// The active routing strategy
    pub fn mode(&self) -> DispatchMode {
        match self.policy {
            QueuePolicy::SharedQueue(_) => DispatchMode::Legacy,
            QueuePolicy::PerHandler(_) => DispatchMode::Direct,
        }
    }

    /// The registration state: handler name to bindings and callbacks
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The legacy dispatch shim
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Register a fire-and-forget handler under the default queue name.
    /// The client expects nothing back; the handler's return value is
    /// discarded.
    pub async fn task<F, Fut>(&self, name: &str, function: F) -> Result<QueueBinding>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_handler(
            InvokeStyle::Task,
            name,
            None,
            Arc::new(FunctionHandler::new(name, function)),
        )
        .await
    }

    /// Register a fire-and-forget handler on an explicit queue name
    pub async fn task_on<F, Fut>(
        &self,
        name: &str,
        queue_name: &str,
        function: F,
    ) -> Result<QueueBinding>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_handler(
            InvokeStyle::Task,
            name,
            Some(queue_name),
            Arc::new(FunctionHandler::new(name, function)),
        )
        .await
    }

    /// Register a request/response handler under the default queue name.
    /// The return value is sent back correlated to the inbound message.
    pub async fn rpc<F, Fut>(&self, name: &str, function: F) -> Result<QueueBinding>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_handler(
            InvokeStyle::Rpc,
            name,
            None,
            Arc::new(FunctionHandler::new(name, function)),
        )
        .await
    }

    /// Register a request/response handler on an explicit queue name
    pub async fn rpc_on<F, Fut>(
        &self,
        name: &str,
        queue_name: &str,
        function: F,
    ) -> Result<QueueBinding>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_handler(
            InvokeStyle::Rpc,
            name,
            Some(queue_name),
            Arc::new(FunctionHandler::new(name, function)),
        )
        .await
    }

    /// Register a [`Handler`] implementation.
    ///
    /// This is the core every registration funnels through: it computes
    /// the queue binding for the active mode, declares the queue, inserts
    /// into the registry, and in legacy mode populates the dispatch table
    /// while installing the router as the queue's message callback.
    /// Registering the same name again appends another binding rather
    /// than replacing the existing ones.
    pub async fn register_handler(
        &self,
        style: InvokeStyle,
        name: &str,
        queue_name: Option<&str>,
        handler: Arc<dyn Handler>,
    ) -> Result<QueueBinding> {
        let name = name.to_lowercase();
        let callback = self.wrap(style, name.clone(), handler);

        let (binding, installed) = match &self.policy {
            QueuePolicy::SharedQueue(shared) => {
                self.router.register(name.clone(), callback).await;
                let binding = QueueBinding {
                    name: shared.clone(),
                    // the override never redirects consumption off the
                    // shared queue, it only annotates the routing key
                    routing_key: queue_name.unwrap_or(shared).to_string(),
                    durable: false,
                };
                (binding, self.router_callback())
            }
            QueuePolicy::PerHandler(prefix) => {
                let queue = queue_name
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{prefix}.{name}"));
                let binding = QueueBinding {
                    name: queue.clone(),
                    routing_key: queue,
                    durable: false,
                };
                (binding, callback)
            }
        };

        self.transport
            .declare_queue(
                &binding.name,
                &self.exchange,
                &binding.routing_key,
                binding.durable,
            )
            .await?;
        self.registry.insert(&name, binding.clone(), installed).await;
        info!(
            "registered {} handler {:?} on queue {:?}",
            style, name, binding.name
        );
        Ok(binding)
    }

    /// The message callback installed on legacy-mode queues
    pub(crate) fn router_callback(&self) -> MessageCallback {
        let router = Arc::clone(&self.router);
        Arc::new(move |body, message| {
            let router = Arc::clone(&router);
            Box::pin(async move { router.route(body, message).await })
        })
    }

    /// Consumption targets: each distinct queue with the callbacks to run
    /// per delivery. Legacy mode collapses to the shared queue with one
    /// router callback so a delivery is dispatched exactly once however
    /// many handlers registered.
    pub(crate) async fn consumer_targets(&self) -> Vec<(String, Vec<MessageCallback>)> {
        match &self.policy {
            QueuePolicy::SharedQueue(shared) => {
                vec![(shared.clone(), vec![self.router_callback()])]
            }
            QueuePolicy::PerHandler(_) => {
                let mut targets: Vec<(String, Vec<MessageCallback>)> = Vec::new();
                for (_, bindings, callbacks) in self.registry.snapshot().await {
                    for (binding, callback) in bindings.into_iter().zip(callbacks) {
                        match targets.iter_mut().find(|(queue, _)| *queue == binding.name) {
                            Some((_, existing)) => existing.push(callback),
                            None => targets.push((binding.name, vec![callback])),
                        }
                    }
                }
                targets
            }
        }
    }

    /// Build the message callback for one registration: invoke the user
    /// handler, for rpc reply with the result, then acknowledge.
    ///
    /// Handler failures propagate out of the callback unhandled. In direct
    /// mode they reach the consumption loop; in legacy mode the router
    /// converts them into a diagnostic reply.
    fn wrap(&self, style: InvokeStyle, name: String, handler: Arc<dyn Handler>) -> MessageCallback {
        match style {
            InvokeStyle::Task => Arc::new(move |body, message| {
                let handler = Arc::clone(&handler);
                let name = name.clone();
                Box::pin(async move {
                    debug!("processing task {:?} with {}", name, body);
                    handler.call(body).await?;
                    message.ack().await
                })
            }),
            InvokeStyle::Rpc => {
                let replies = self.replies.clone();
                Arc::new(move |body, message| {
                    let handler = Arc::clone(&handler);
                    let replies = replies.clone();
                    let name = name.clone();
                    Box::pin(async move {
                        debug!("processing rpc {:?} with {}", name, body);
                        let response = handler.call(body).await?;
                        debug!("received response {}", response);
                        replies.respond(&message, response).await;
                        message.ack().await
                    })
                })
            }
        }
    }
}

impl fmt::Debug for Registrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrator")
            .field("mode", &self.mode())
            .field("exchange", &self.exchange)
            .finish()
    }
}
