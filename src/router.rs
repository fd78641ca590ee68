use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::{DispatchError, Result};
use crate::message::{Envelope, InboundMessage};
use crate::registry::MessageCallback;
use crate::reply::ReplySender;
use tracing::{debug, error};

/// What examining one delivery on the shared legacy queue produced.
enum Resolution {
    /// Envelope well-formed and the command is in the dispatch table
    Dispatch {
        command: String,
        data: Value,
        callback: MessageCallback,
    },
    /// Envelope missing `command` or `data`, or the command is unknown;
    /// the delivery ends as an acknowledged diagnostic reply
    Reject(DispatchError),
}

/// Dispatches deliveries on a shared legacy queue to the handler named by
/// the envelope's `command` field.
///
/// The shared queue is a single point of ingress for many logical
/// endpoints, so malformed or unroutable traffic must never crash the
/// consumption loop: every failure path ends in an acknowledgement plus a
/// diagnostic reply, and the queue always drains.
pub struct MessageRouter {
    dispatch: RwLock<HashMap<String, MessageCallback>>,
    replies: ReplySender,
}

impl MessageRouter {
    /// Create a router with an empty dispatch table
    pub fn new(replies: ReplySender) -> Self {
        Self {
            dispatch: RwLock::new(HashMap::new()),
            replies,
        }
    }

    /// Insert `command` into the dispatch table. Expected to complete
    /// before consumption begins; steady-state operation only reads.
    pub async fn register(&self, command: impl Into<String>, callback: MessageCallback) {
        self.dispatch.write().await.insert(command.into(), callback);
    }

    /// Whether `command` is in the dispatch table
    pub async fn resolves(&self, command: &str) -> bool {
        self.dispatch.read().await.contains_key(command)
    }

    /// Route one delivery through the dispatch table.
    ///
    /// Three outcomes: a well-formed, resolvable envelope is forwarded to
    /// the wrapped handler (which replies and acknowledges); a malformed
    /// envelope or an unresolvable command is acknowledged here and
    /// answered with a structured error reply; a handler failure is
    /// converted into the same error-reply shape.
    pub async fn route(&self, body: Value, message: Arc<InboundMessage>) -> Result<()> {
        match self.resolve(&body).await {
            Resolution::Dispatch {
                command,
                data,
                callback,
            } => {
                debug!("calling {:?} with {}", command, data);
                if let Err(e) = callback(data, Arc::clone(&message)).await {
                    self.reject(DispatchError::Resolution(e.to_string()), &body, &message)
                        .await;
                }
                Ok(())
            }
            Resolution::Reject(error) => {
                self.reject(error, &body, &message).await;
                Ok(())
            }
        }
    }

    async fn resolve(&self, body: &Value) -> Resolution {
        let (command, data) = match Envelope::split(body) {
            Ok(parts) => parts,
            Err(missing) => return Resolution::Reject(DispatchError::MalformedRequest(missing)),
        };
        match self.dispatch.read().await.get(&command).cloned() {
            Some(callback) => Resolution::Dispatch {
                command,
                data,
                callback,
            },
            None => Resolution::Reject(DispatchError::Resolution(format!(
                "unknown command {command:?}"
            ))),
        }
    }

    /// Acknowledge the delivery and answer with `{"error": .., "sent": ..}`
    /// so the client can tell a bad envelope from a bad command.
    async fn reject(&self, error: DispatchError, body: &Value, message: &InboundMessage) {
        let text = error.to_string();
        error!("{text}");
        if let Err(e) = message.ack().await {
            error!("failed to acknowledge rejected message: {e}");
        }
        self.replies
            .respond(message, json!({"error": text, "sent": body}))
            .await;
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter").finish()
    }
}
