use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Wire wrapper used on a shared legacy queue: many logical commands
/// multiplexed onto one physical queue, told apart by `command`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Handler name the body is addressed to
    pub command: String,
    /// Payload forwarded to the resolved handler
    pub data: Value,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(command: impl Into<String>, data: impl Serialize) -> Result<Self> {
        Ok(Self {
            command: command.into(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Split a raw body into `(command, data)`, naming the missing key on
    /// failure. A non-string `command` counts as missing.
    pub fn split(body: &Value) -> std::result::Result<(String, Value), &'static str> {
        let command = body
            .get("command")
            .and_then(Value::as_str)
            .ok_or("command")?;
        let data = body.get("data").cloned().ok_or("data")?;
        Ok((command.to_string(), data))
    }

    /// Serialize envelope to bytes for transmission
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Transport-side acknowledgement for a single delivery.
#[async_trait]
pub trait MessageAck: Send + Sync {
    /// Confirm the delivery to the broker.
    async fn ack(&self) -> Result<()>;
}

/// One inbound delivery: the decoded body plus the reply-routing metadata
/// the transport attached to it.
///
/// The dispatch layer borrows it for the duration of one invocation and
/// must acknowledge it exactly once on every control-flow path. A latch
/// makes later [`ack`](Self::ack) calls no-ops, so the router can treat
/// acknowledgement as idempotent.
pub struct InboundMessage {
    body: Value,
    reply_to: Option<String>,
    correlation_id: Option<String>,
    acked: AtomicBool,
    acker: Box<dyn MessageAck>,
}

impl InboundMessage {
    /// Create a new inbound message around a transport acker
    pub fn new(
        body: Value,
        reply_to: Option<String>,
        correlation_id: Option<String>,
        acker: Box<dyn MessageAck>,
    ) -> Self {
        Self {
            body,
            reply_to,
            correlation_id,
            acked: AtomicBool::new(false),
            acker,
        }
    }

    /// The message body as received
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Queue the reply should be published to, if the caller sent one
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Correlation id to stamp on the reply, if the caller sent one
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Acknowledge this delivery. The first call reaches the transport;
    /// every later call is a no-op.
    pub async fn ack(&self) -> Result<()> {
        if self.acked.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.acker.ack().await
    }

    /// Whether the delivery has been acknowledged
    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("body", &self.body)
            .field("reply_to", &self.reply_to)
            .field("correlation_id", &self.correlation_id)
            .field("acked", &self.is_acked())
            .finish()
    }
}
